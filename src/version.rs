const fn build_version(opt: Option<&'static str>) -> &'static str {
    match opt {
        Some(val) => val,
        None => env!("CARGO_PKG_VERSION"),
    }
}

/// Release builds may stamp `MOUNTWATCH_VERSION`; otherwise the crate version.
pub const VERSION: &str = build_version(option_env!("MOUNTWATCH_VERSION"));

/// User-Agent sent on every outgoing request.
pub fn user_agent() -> String {
    format!("{}/{VERSION}", env!("CARGO_PKG_NAME"))
}
