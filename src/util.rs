//! Environment overrides for the hub
//!
//! Values are read after `dotenv` has loaded a `.env` file, if any.
//! Unparsable values are ignored.

use std::net::IpAddr;

const CRAFTWATCH_HOST: &str = "CRAFTWATCH_HOST";

const CRAFTWATCH_PORT: &str = "CRAFTWATCH_PORT";

const CRAFTWATCH_AUTH_TOKEN: &str = "CRAFTWATCH_AUTH_TOKEN";

pub fn get_host() -> Option<IpAddr> {
    std::env::var(CRAFTWATCH_HOST)
        .ok()
        .and_then(|host| host.trim().parse().ok())
}

pub fn get_port() -> Option<u16> {
    std::env::var(CRAFTWATCH_PORT)
        .ok()
        .and_then(|port| port.trim().parse().ok())
}

pub fn get_auth_token() -> Option<String> {
    std::env::var(CRAFTWATCH_AUTH_TOKEN)
        .ok()
        .filter(|token| !token.is_empty())
}
