use std::{
    net::{IpAddr, SocketAddr},
    str::FromStr,
};

use actix_web::HttpRequest;
use log::{debug, trace, warn};
use regex::Regex;

/// Get the remote IP address from the request. It uses 3 sources to determine the IP address, in decreasing order
/// of preference:
/// 1. The `X-Forwarded-For` header, iif `use_x_forwarded_for` is set to true in the configuration.
/// 2. The `Forwarded` header, iif `use_forwarded` is set to true in the configuration.
/// 3. The peer address from the connection info.
pub fn get_remote_ip(req: &HttpRequest, use_x_forwarded_for: bool, use_forwarded: bool) -> Option<IpAddr> {
    let mut result = None;
    if use_x_forwarded_for {
        trace!("Checking X-Forwarded-For header");
        // The left-most entry is the original client; proxies append themselves
        result = req
            .headers()
            .get("X-Forwarded-For")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.split(',').next())
            .and_then(parse_ip);
        if let Some(ip) = result {
            debug!("Using X-Forwarded-For header for remote address: {ip}");
        }
    }
    if use_forwarded && result.is_none() {
        trace!("Checking Forwarded header");
        result = req.headers().get("Forwarded").and_then(|v| v.to_str().ok()).and_then(forwarded_for);
        if let Some(ip) = result {
            debug!("Using Forwarded header for remote address: {ip}");
        }
    }
    result.or_else(|| {
        let peer_addr = req.connection_info().peer_addr().map(|a| a.to_string());
        trace!("Using Peer address for remote address: {:?}", peer_addr);
        peer_addr.and_then(|s| parse_ip(&s))
    })
}

fn forwarded_for(header: &str) -> Option<IpAddr> {
    let re = Regex::new(r#"(?i)for="?\[?(?P<ip>[^;,"\]]+)"#)
        .map_err(|e| warn!("Could not compile the Forwarded header pattern. {e}"))
        .ok()?;
    re.captures(header).and_then(|caps| caps.name("ip")).and_then(|m| parse_ip(m.as_str()))
}

/// Accepts a bare IP, or an IP with a port.
fn parse_ip(s: &str) -> Option<IpAddr> {
    let s = s.trim();
    IpAddr::from_str(s).ok().or_else(|| SocketAddr::from_str(s).ok().map(|a| a.ip()))
}
