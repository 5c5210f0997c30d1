use taskdeck_shared::TaskId;
use tracing::debug;

/// Checkpoint in front of single-item deletes. The only way to reach the
/// held target is [`ConfirmationGate::confirm`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConfirmationGate {
    #[default]
    Closed,
    PendingConfirmation {
        target_id: TaskId,
    },
}

impl ConfirmationGate {
    /// Holds `target_id` until confirmed or cancelled. A newer request
    /// replaces an unanswered one.
    pub fn request(&mut self, target_id: TaskId) {
        if let ConfirmationGate::PendingConfirmation { target_id: prior } = *self {
            debug!(prior, target_id, "replacing unanswered delete request");
        }
        *self = ConfirmationGate::PendingConfirmation { target_id };
    }

    pub fn pending_target(&self) -> Option<TaskId> {
        match self {
            ConfirmationGate::Closed => None,
            ConfirmationGate::PendingConfirmation { target_id } => Some(*target_id),
        }
    }

    pub fn is_closed(&self) -> bool {
        matches!(self, ConfirmationGate::Closed)
    }

    /// Closes the gate and runs `action` once with the held target. Returns
    /// `None` without running anything when the gate was already closed.
    pub fn confirm<F, R>(&mut self, action: F) -> Option<R>
    where
        F: FnOnce(TaskId) -> R,
    {
        let target_id = std::mem::take(self).pending_target()?;
        debug!(target_id, "delete confirmed");
        Some(action(target_id))
    }

    /// Drops the pending request. Returns the discarded target, if any.
    pub fn cancel(&mut self) -> Option<TaskId> {
        let discarded = std::mem::take(self).pending_target();
        if let Some(target_id) = discarded {
            debug!(target_id, "delete cancelled");
        }
        discarded
    }
}

/// Plain yes/no question, used where there is no target to carry
/// (delete-all).
pub trait Prompt {
    fn confirm(&self, message: &str) -> bool;
}

impl<F> Prompt for F
where
    F: Fn(&str) -> bool,
{
    fn confirm(&self, message: &str) -> bool {
        self(message)
    }
}
