use crate::error::SyncError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Error,
    Info,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub text: String,
}

impl Notice {
    pub fn is_error(&self) -> bool {
        self.level == NoticeLevel::Error
    }
}

/// The single message currently shown to the user. A new message replaces
/// the previous one.
#[derive(Debug, Clone, Default)]
pub struct ErrorSurface {
    current: Option<Notice>,
    last_error: Option<SyncError>,
}

impl ErrorSurface {
    pub fn report(&mut self, err: &SyncError) {
        self.current = Some(Notice {
            level: NoticeLevel::Error,
            text: err.to_string(),
        });
        self.last_error = Some(err.clone());
    }

    pub fn inform(&mut self, text: impl Into<String>) {
        self.current = Some(Notice {
            level: NoticeLevel::Info,
            text: text.into(),
        });
        self.last_error = None;
    }

    pub fn clear(&mut self) {
        self.current = None;
        self.last_error = None;
    }

    pub fn current(&self) -> Option<&Notice> {
        self.current.as_ref()
    }

    /// Structured form of the shown error, when the notice is one.
    pub fn error(&self) -> Option<&SyncError> {
        self.last_error.as_ref()
    }
}
