//! Уведомления systemd через sd-notify.
//!
//! - `READY=1` после первого успешного входа на шлюз;
//! - `STATUS=...` со статистикой опроса.
//!
//! Вне systemd отправка завершается ошибкой, которую можно игнорировать.

use anyhow::{Context, Result};
use libsystemd::daemon::NotifyState;

/// Предел длины строки статуса.
const MAX_STATUS_CHARS: usize = 200;

/// Отправляет systemd уведомление READY=1.
pub fn notify_ready() -> Result<()> {
    libsystemd::daemon::notify(false, &[NotifyState::Ready])
        .context("Failed to send READY notification to systemd")?;
    Ok(())
}

/// Отправляет STATUS=..., видимый в `systemctl status tegstatsd`.
///
/// Ошибки игнорируются: вне systemd это нормально.
pub fn notify_status(status: &str) {
    let state = NotifyState::Status(truncate_status(status));
    let _ = libsystemd::daemon::notify(false, &[state]);
}

/// Обрезать статус по границе символа, а не байта.
fn truncate_status(status: &str) -> String {
    status.chars().take(MAX_STATUS_CHARS).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notify_functions_tolerate_missing_systemd() {
        let _ = notify_ready();
        notify_status("cycles: 10 (10 ok, 0 failed), avg 120ms, written: 10");
        notify_status("");
    }

    #[test]
    fn status_is_truncated_on_char_boundary() {
        assert_eq!(truncate_status("short"), "short");

        let long = "x".repeat(500);
        assert_eq!(truncate_status(&long).len(), MAX_STATUS_CHARS);

        let cyrillic = "ц".repeat(300);
        let truncated = truncate_status(&cyrillic);
        assert_eq!(truncated.chars().count(), MAX_STATUS_CHARS);
        assert_eq!(truncated.len(), MAX_STATUS_CHARS * 2);
    }
}
