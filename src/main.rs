// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use memsession::{
    cfg::{cli::Cli, logger::init_logger},
    controller::RequestController,
    monitoring::Monitoring,
    server::Server,
    store::Store,
};
use tokio_util::sync::CancellationToken;
use tracing::info;

fn main() -> Result<()> {
    let cli = Cli::parse();

    let _log_guard = init_logger(&cli.log_config)?;

    let threads = cli.resolve_threads()?;

    let store = Arc::new(Store::new());
    if let Some(limit) = cli.limit {
        store.set_limit(limit);
    }
    let monitoring = Arc::new(Monitoring::new());
    let controller = Arc::new(RequestController::new(
        Arc::clone(&store),
        Arc::clone(&monitoring),
    ));

    info!(port = cli.port, threads, limit = cli.limit, "starting");

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(threads)
        .enable_all()
        .build()
        .context("failed to build runtime")?;

    runtime.block_on(async move {
        let cancel = CancellationToken::new();
        let server = Server::new(cli.port, controller, monitoring, cancel.clone());

        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("shutdown requested");
                cancel.cancel();
            }
        });

        server.run().await
    })
}
