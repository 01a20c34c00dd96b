pub mod auth;
pub mod cache;
pub mod category_store;
pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod http;
pub mod mock;
pub mod notify;
pub mod optimistic;
pub mod render;
pub mod session;
pub mod task_store;
pub mod token;
pub mod transport;
pub mod visuals;

use std::ffi::OsString;

use anyhow::Context;
use clap::Parser;
pub use error::{
  Error,
  Result
};
use tracing::{
  debug,
  info
};

#[tracing::instrument(skip_all)]
pub fn run(
  raw_args: Vec<OsString>
) -> anyhow::Result<()> {
  let pre =
    cli::preprocess_args(&raw_args);
  let cli = cli::GlobalCli::parse_from(
    pre.cleaned_args
  );

  cli::init_tracing(
    cli.verbose,
    cli.quiet
  )?;

  info!(
    verbose = cli.verbose,
    quiet = cli.quiet,
    "starting tarefas CLI"
  );
  debug!(?pre.rc_overrides, "preprocessed rc overrides");

  let mut cfg = config::Config::load(
    cli.rc_file.as_deref()
  )?;
  cfg.apply_overrides(
    pre.rc_overrides.into_iter().chain(
      cli
        .rc_overrides
        .into_iter()
        .map(|kv| (kv.key, kv.value))
    )
  );

  let backend = if cli.mock {
    config::Backend::Mock
  } else {
    cfg.backend()?
  };

  let data_dir =
    config::resolve_data_dir(
      &cfg,
      cli.data.as_deref()
    )
    .context(
      "failed to resolve data \
       directory"
    )?;

  let session = session::Session::open(
    &cfg, &data_dir, backend
  )
  .with_context(|| {
    format!(
      "failed to open session with \
       data in {}",
      data_dir.display()
    )
  })?;

  let renderer =
    render::Renderer::new(&cfg)?;

  let runtime =
    tokio::runtime::Builder::new_current_thread()
      .enable_all()
      .build()
      .context(
        "failed to start async \
         runtime"
      )?;

  runtime.block_on(
    commands::execute(
      &session,
      &renderer,
      cli.command
    )
  )?;

  info!("done");
  Ok(())
}
