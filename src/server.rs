//! Server wiring: the shared context and the accept loop.

use crate::commands::{replay, CommandHandler};
use crate::config::Config;
use crate::connection::handle_connection;
use crate::persistence::AppendOnlyLog;
use crate::pubsub::PubSub;
use crate::storage::Store;
use std::io;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};

/// Everything a connection needs, built once at startup and cloned into
/// each connection task.
#[derive(Clone)]
pub struct ServerContext {
    pub store: Arc<Store>,
    pub pubsub: Arc<PubSub>,
    pub commands: CommandHandler,
}

impl ServerContext {
    /// Builds a context around `store`, logging mutations to `log` if given.
    pub fn new(store: Arc<Store>, log: Option<Arc<AppendOnlyLog>>) -> Self {
        let commands = CommandHandler::new(Arc::clone(&store));
        let commands = match log {
            Some(log) => commands.with_log(log),
            None => commands,
        };

        Self {
            store,
            pubsub: Arc::new(PubSub::new()),
            commands,
        }
    }

    /// Builds the context described by `config` and replays its log.
    pub async fn open(config: &Config) -> io::Result<Self> {
        let store = Arc::new(Store::new(config.max_keys));
        let log = Arc::new(AppendOnlyLog::new(&config.aof_path));

        replay(&store, &log).await?;
        info!(
            max_keys = config.max_keys,
            path = %log.path().display(),
            "Store initialized"
        );

        Ok(Self::new(store, Some(log)))
    }
}

/// Accepts connections forever, one task per client.
pub async fn serve(listener: TcpListener, ctx: ServerContext) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let ctx = ctx.clone();
                tokio::spawn(async move {
                    handle_connection(stream, addr, ctx).await;
                });
            }
            Err(e) => {
                error!(error = %e, "Failed to accept connection");
            }
        }
    }
}
