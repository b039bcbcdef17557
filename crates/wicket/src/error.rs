#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("{0}")]
    Proxy(#[from] wicket_proxy::ProxyError),
}
