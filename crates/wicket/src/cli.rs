use std::net::IpAddr;

use clap::{ArgAction, Parser};

#[derive(Parser)]
#[command(name = "wicket", about = "HTTP/HTTPS forward proxy")]
pub struct Cli {
    /// Port to listen on
    #[arg(default_value_t = 8888)]
    pub port: u16,

    /// Address to bind the listener to
    #[arg(long, default_value = "0.0.0.0", value_name = "ADDR")]
    pub bind: IpAddr,

    /// Upstream connection timeout in seconds
    #[arg(long, default_value_t = 30, value_name = "SECONDS")]
    pub connect_timeout: u64,

    /// Increase log verbosity (-v, -vv)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,
}
