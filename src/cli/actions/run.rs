use super::Action;

/// Execute the action's business logic by delegating to the appropriate module
pub async fn execute(action: Action) -> anyhow::Result<()> {
    match action {
        Action::Scan {
            config,
            timeout,
            filter,
            listen,
            port,
        } => crate::server::start(config, timeout, filter, listen, port).await,
    }
}
