use std::{env, env::VarError};

/// There's no real CLI for the server, so just do quick 'n dirty
pub fn handle_command_line_args() -> bool {
    let has_cli_args = env::args().count() > 1;
    if has_cli_args {
        // We don't expect any CLI args, so always print the help
        display_readme();
        display_envs();
    }
    has_cli_args
}

fn display_readme() {
    const README: &str = include_str!("./cli-help.txt");
    println!("\n{README}\n");
}

fn display_envs() {
    // Be explicit about which envars to print, so as to avoid accidentally exposing secrets. RPG_ETH_RPC_URL is left
    // out since hosted endpoints carry an API key.
    const DISPLAY_ENVS: [&str; 22] = [
        "RUST_LOG",
        "RPG_HOST",
        "RPG_PORT",
        "RPG_DATABASE_URL",
        "RPG_USE_X_FORWARDED_FOR",
        "RPG_USE_FORWARDED",
        "RPG_WALLET_BTC",
        "RPG_WALLET_ETH",
        "RPG_BTC_EXPLORER_URL",
        "RPG_PRICE_API_URL",
        "RPG_USDC_CONTRACT",
        "RPG_USDT_CONTRACT",
        "RPG_BTC_CONFIRMATIONS",
        "RPG_ETH_CONFIRMATIONS",
        "RPG_PRICE_TOLERANCE",
        "RPG_POLL_INTERVAL",
        "RPG_PAYMENT_WINDOW_HOURS",
        "RPG_LOOKBACK_BLOCKS",
        "RPG_BTC_TX_LIMIT",
        "RPG_EXPECTED_USD",
        "RPG_RATE_LIMIT_PER_MINUTE",
        "RPG_DISABLE_HTTP",
    ];

    println!("Current environment values (EXCLUDING variables that contain secrets):");
    DISPLAY_ENVS.iter().for_each(|&name| {
        let val = match env::var(name) {
            Ok(s) => s,
            Err(VarError::NotPresent) => "Not set".into(),
            Err(VarError::NotUnicode(s)) => format!("Invalid value: {}", s.to_string_lossy()),
        };
        println!("  {name:<35} {val:<15}");
    })
}
