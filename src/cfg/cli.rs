// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use anyhow::{Result, bail};
use clap::Parser;

/// In-memory session/key-value store server.
#[derive(Debug, Parser)]
#[command(name = "memsession")]
#[command(about = "In-memory session/key-value store server")]
pub struct Cli {
    /// TCP port to listen on.
    #[arg(short = 'p', long = "port", default_value_t = 2901,
          value_parser = clap::value_parser!(u16).range(1..))]
    pub port: u16,

    /// Maximum number of live sessions; unlimited when omitted.
    #[arg(short = 'l', long = "limit",
          value_parser = clap::value_parser!(u32).range(1..))]
    pub limit: Option<u32>,

    /// Worker threads; defaults to the hardware concurrency.
    #[arg(short = 't', long = "threads",
          value_parser = clap::value_parser!(u16).range(1..))]
    pub threads: Option<u16>,

    /// Logger configuration file; built-in defaults apply when the file
    /// does not exist.
    #[arg(long = "log-config", default_value = "config/logger.yaml")]
    pub log_config: String,
}

impl Cli {
    /// Resolves the worker thread count against the hardware concurrency.
    pub fn resolve_threads(&self) -> Result<usize> {
        let hardware = std::thread::available_parallelism()
            .map(std::num::NonZeroUsize::get)
            .unwrap_or(1);

        match self.threads {
            None => Ok(hardware),
            Some(t) if usize::from(t) <= hardware => Ok(usize::from(t)),
            Some(t) => bail!("-t {t} exceeds hardware concurrency ({hardware})"),
        }
    }
}
