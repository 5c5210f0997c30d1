use std::io::{self, IsTerminal, Write};

use anyhow::anyhow;
use chrono::NaiveDate;
use taskdeck_shared::{TaskItem, TaskStatus};
use unicode_width::UnicodeWidthStr;

use crate::config::Config;
use crate::surface::{Notice, NoticeLevel};
use crate::task::Board;

#[derive(Debug, Clone)]
pub struct Renderer {
    color: bool,
}

impl Renderer {
    pub fn new(cfg: &Config) -> anyhow::Result<Self> {
        let color_cfg = cfg.get("color").unwrap_or_else(|| "on".to_string());
        let color = match color_cfg.to_ascii_lowercase().as_str() {
            "on" | "yes" | "true" | "1" => true,
            "off" | "no" | "false" | "0" => false,
            other => return Err(anyhow!("invalid color setting: {other}")),
        };

        Ok(Self { color })
    }

    pub fn plain() -> Self {
        Self { color: false }
    }

    #[tracing::instrument(skip(self, board, today))]
    pub fn print_board(&mut self, board: &Board, today: NaiveDate) -> anyhow::Result<()> {
        let out = io::stdout().lock();
        self.write_board(out, board, today)
    }

    /// One column per status; rows are filled top-down per column.
    pub fn write_board<W: Write>(
        &self,
        mut writer: W,
        board: &Board,
        today: NaiveDate,
    ) -> anyhow::Result<()> {
        if board.is_empty() {
            writeln!(writer, "No tasks yet")?;
            return Ok(());
        }

        let headers = board
            .columns
            .iter()
            .map(|column| format!("{} ({})", column.status.label(), column.items.len()))
            .collect::<Vec<_>>();

        let depth = board
            .columns
            .iter()
            .map(|column| column.items.len())
            .max()
            .unwrap_or(0);

        let mut rows = Vec::with_capacity(depth);
        for row in 0..depth {
            rows.push(
                board
                    .columns
                    .iter()
                    .map(|column| {
                        column
                            .items
                            .get(row)
                            .map(|item| self.card(item, today))
                            .unwrap_or_default()
                    })
                    .collect(),
            );
        }

        write_table(&mut writer, headers, rows)?;
        writeln!(writer)?;
        writeln!(writer, "{} task(s)", board.total())?;
        Ok(())
    }

    pub fn print_notice(&self, notice: &Notice) -> anyhow::Result<()> {
        match notice.level {
            NoticeLevel::Error => {
                let mut err = io::stderr().lock();
                writeln!(err, "{}", self.paint(&notice.text, "31"))?;
            }
            NoticeLevel::Info => {
                let mut out = io::stdout().lock();
                writeln!(out, "{}", notice.text)?;
            }
        }
        Ok(())
    }

    fn card(&self, item: &TaskItem, today: NaiveDate) -> String {
        let id = self.paint(&item.id.to_string(), "33");
        let due = item.due_date.format("%Y-%m-%d").to_string();
        let due = if item.due_date < today && item.status != TaskStatus::Done {
            self.paint(&due, "31")
        } else {
            due
        };
        format!("{id} {} ({due})", item.task)
    }

    fn paint(&self, text: &str, code: &str) -> String {
        if !self.color || !io::stdout().is_terminal() {
            return text.to_string();
        }
        format!("\x1b[{code}m{text}\x1b[0m")
    }
}

fn write_table<W: Write>(
    mut writer: W,
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
) -> anyhow::Result<()> {
    let column_count = headers.len();
    let mut widths = vec![0usize; column_count];

    for (idx, header) in headers.iter().enumerate() {
        widths[idx] = widths[idx].max(UnicodeWidthStr::width(header.as_str()));
    }

    for row in &rows {
        for (idx, cell) in row.iter().enumerate() {
            widths[idx] = widths[idx].max(UnicodeWidthStr::width(strip_ansi(cell).as_str()));
        }
    }

    for idx in 0..column_count {
        write!(writer, "{:width$} ", headers[idx], width = widths[idx])?;
    }
    writeln!(writer)?;

    for idx in 0..column_count {
        write!(writer, "{:-<width$} ", "", width = widths[idx])?;
    }
    writeln!(writer)?;

    for row in rows {
        for idx in 0..column_count {
            let cell = &row[idx];
            let visible_width = UnicodeWidthStr::width(strip_ansi(cell).as_str());
            let padding = widths[idx].saturating_sub(visible_width);
            write!(writer, "{}{} ", cell, " ".repeat(padding))?;
        }
        writeln!(writer)?;
    }

    Ok(())
}

fn strip_ansi(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut escaped = false;

    for ch in s.chars() {
        if escaped {
            if ch == 'm' {
                escaped = false;
            }
            continue;
        }

        if ch == '\x1b' {
            escaped = true;
            continue;
        }

        out.push(ch);
    }

    out
}
