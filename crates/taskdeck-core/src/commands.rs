use anyhow::anyhow;
use chrono::Local;
use tracing::{debug, info, instrument};

use crate::cli::{Command, StdinPrompt};
use crate::config::Config;
use crate::confirm::Prompt;
use crate::gateway::TaskGateway;
use crate::render::Renderer;
use crate::sync::{DELETE_ONE_PROMPT, SkipReason, SyncController};
use crate::task::DraftForm;

#[instrument(skip(controller, cfg, renderer))]
pub async fn dispatch<G: TaskGateway>(
    controller: &SyncController<G>,
    cfg: &Config,
    renderer: &mut Renderer,
    command: Command,
) -> anyhow::Result<()> {
    let loaded = controller.refresh().await?;
    debug!(loaded, "board loaded");

    let ask_first = cfg.get_bool("confirm").unwrap_or(true);

    match command {
        Command::List => {}
        Command::Add { due, tasks } => {
            let mut forms = tasks
                .iter()
                .map(|task| DraftForm::new(task.as_str(), due.as_str()))
                .collect::<Vec<_>>();
            let report = controller.submit_all(&mut forms).await;
            if report.is_committed() {
                controller.inform(format!("Added {} todo(s)", forms.len()));
            }
        }
        Command::Status { id, status } => {
            controller.update_status(id, status).await;
        }
        Command::Delete { id, yes } => {
            if !controller.request_delete(id) {
                return Err(anyhow!("No task with id {id}"));
            }
            let prompt = StdinPrompt::new(yes || !ask_first);
            if prompt.confirm(DELETE_ONE_PROMPT) {
                let report = controller.confirm_delete().await;
                if report.is_committed() {
                    controller.inform(format!("Deleted todo {id}"));
                }
            } else {
                controller.cancel_delete();
                controller.inform("Nothing deleted");
            }
        }
        Command::Clear { yes } => {
            let count = controller.tasks().len();
            let prompt = StdinPrompt::new(yes || !ask_first);
            let report = controller.delete_all(&prompt).await;
            if report.is_committed() {
                controller.inform(format!("Deleted {count} todos"));
            } else if report.skipped == Some(SkipReason::Declined) {
                controller.inform("Nothing deleted");
            }
        }
    }

    renderer.print_board(&controller.board(), Local::now().date_naive())?;

    match controller.notice() {
        Some(notice) if notice.is_error() => Err(anyhow!(notice.text)),
        Some(notice) => {
            info!(notice = %notice.text, "command finished");
            renderer.print_notice(&notice)
        }
        None => Ok(()),
    }
}
