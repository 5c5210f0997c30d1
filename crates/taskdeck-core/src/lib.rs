pub mod cli;
pub mod commands;
pub mod config;
pub mod confirm;
pub mod error;
pub mod gateway;
pub mod queue;
pub mod render;
pub mod store;
pub mod surface;
pub mod sync;
pub mod task;

use std::ffi::OsString;

use anyhow::Context;
use clap::Parser;
use tracing::{
  debug,
  info,
  warn
};

pub use error::{
  Operation,
  SyncError
};
pub use gateway::{
  HttpTaskGateway,
  SessionToken,
  TaskGateway
};
pub use sync::{
  MutationReport,
  MutationState,
  SyncController,
  SyncOptions
};

#[tracing::instrument(skip_all)]
pub fn run(
  raw_args: Vec<OsString>
) -> anyhow::Result<()> {
  let pre =
    cli::preprocess_args(&raw_args)?;
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
    "starting taskdeck"
  );
  debug!(?pre.rc_overrides, "preprocessed rc overrides");

  let mut cfg = config::Config::load(
    cli.config.as_deref()
  )?;
  cfg.apply_overrides(
    pre.rc_overrides.into_iter().chain(
      cli
        .rc_overrides
        .into_iter()
        .map(|kv| (kv.key, kv.value))
    )
  );

  let session = match cfg
    .resolve_token(cli.token.as_deref())
  {
    | Some(token) => {
      SessionToken::new(token)
    }
    | None => {
      warn!(
        "no API token configured; \
         requests will be refused"
      );
      SessionToken::default()
    }
  };

  let api = cfg.api();
  let gateway =
    HttpTaskGateway::new(&api, session)
      .with_context(|| {
        format!(
          "failed to set up client for \
           {}",
          api.endpoint()
        )
      })?;
  let controller = SyncController::new(
    gateway,
    cfg.sync_options()
  );

  let mut renderer =
    render::Renderer::new(&cfg)?;
  let command = cli
    .command
    .unwrap_or(cli::Command::List);

  let runtime =
    tokio::runtime::Builder::new_current_thread()
      .enable_all()
      .build()
      .context(
        "failed to start async runtime"
      )?;
  runtime.block_on(commands::dispatch(
    &controller,
    &cfg,
    &mut renderer,
    command
  ))?;

  info!("done");
  Ok(())
}
