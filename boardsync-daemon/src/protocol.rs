//! Wire protocol between the CLI and the daemon.
//!
//! One command, one reply, one connection: the client writes a single
//! tagged JSON line over the unix socket and reads a single tagged JSON
//! line back. Commands and replies are closed enums, so an unknown
//! command fails at parse time on the daemon side rather than at
//! string-match time.

use std::io::{BufRead, BufReader, ErrorKind, Write};
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::thread::sleep;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use boardsync_engine::{PullReport, PushReport};

use crate::error::{io_err, DaemonError};
use crate::paths::socket_path;

// ---------------------------------------------------------------------------
// Commands and replies
// ---------------------------------------------------------------------------

/// What a client can ask the daemon to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum DaemonCommand {
    Status,
    Pull,
    Push,
    Stop,
}

/// What the daemon answers with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reply", rename_all = "snake_case")]
pub enum DaemonReply {
    Status(DaemonStatusInfo),
    Reconciled(ReconcileSummary),
    Stopping,
    Error { message: String },
}

/// Pull-direction outcome, mirroring [`PullReport`] on the wire.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullSummary {
    pub written: usize,
    pub deleted: usize,
    pub commit: Option<String>,
    pub pushed: bool,
}

impl From<PullReport> for PullSummary {
    fn from(report: PullReport) -> Self {
        PullSummary {
            written: report.written,
            deleted: report.deleted,
            commit: report.commit,
            pushed: report.pushed,
        }
    }
}

/// Push-direction outcome, mirroring [`PushReport`] on the wire.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushSummary {
    pub upserted: usize,
    pub deleted: usize,
    pub skipped: usize,
}

impl From<PushReport> for PushSummary {
    fn from(report: PushReport) -> Self {
        PushSummary {
            upserted: report.upserted,
            deleted: report.deleted,
            skipped: report.skipped,
        }
    }
}

/// What one reconciliation did. `push` is present only for runs that had a
/// files → store direction; `revision` is the repository head afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileSummary {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revision: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub push: Option<PushSummary>,
    pub pull: PullSummary,
}

/// One completed reconciliation, as kept for `status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRecord {
    /// `"poller"` or `"socket"`.
    pub trigger: String,
    /// `"tick"`, `"pull"` or `"push-all"`.
    pub kind: String,
    pub at_unix: u64,
    pub duration_ms: u64,
    pub summary: ReconcileSummary,
}

/// Answer to [`DaemonCommand::Status`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaemonStatusInfo {
    pub running: bool,
    pub started_at_unix: u64,
    pub runs: usize,
    pub last_run: Option<RunRecord>,
    pub socket: String,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Blocking client side of the socket protocol.
pub struct DaemonClient {
    reader: BufReader<UnixStream>,
    socket: PathBuf,
}

impl DaemonClient {
    /// Connect to the daemon socket under `home`. A missing socket or a
    /// refused connection both mean the daemon is not running.
    pub fn connect(home: &Path) -> Result<Self, DaemonError> {
        let socket = socket_path(home);
        if !socket.exists() {
            return Err(DaemonError::DaemonNotRunning { socket });
        }

        let stream = UnixStream::connect(&socket).map_err(|err| match err.kind() {
            ErrorKind::NotFound | ErrorKind::ConnectionRefused | ErrorKind::ConnectionReset => {
                DaemonError::DaemonNotRunning {
                    socket: socket.clone(),
                }
            }
            _ => io_err(&socket, err),
        })?;
        Ok(Self::over(stream, socket))
    }

    fn over(stream: UnixStream, socket: PathBuf) -> Self {
        DaemonClient {
            reader: BufReader::new(stream),
            socket,
        }
    }

    /// Send one command and read the reply. The daemon closes the
    /// connection afterwards; send one command per client.
    pub fn send(&mut self, command: DaemonCommand) -> Result<DaemonReply, DaemonError> {
        let mut line = serde_json::to_string(&command)?;
        line.push('\n');
        self.reader
            .get_mut()
            .write_all(line.as_bytes())
            .map_err(|e| io_err(&self.socket, e))?;

        let mut reply_line = String::new();
        let read = self
            .reader
            .read_line(&mut reply_line)
            .map_err(|e| io_err(&self.socket, e))?;
        if read == 0 {
            return Err(DaemonError::Protocol(
                "daemon closed the connection before replying".to_string(),
            ));
        }
        Ok(serde_json::from_str(reply_line.trim_end())?)
    }
}

// ---------------------------------------------------------------------------
// Request helpers
// ---------------------------------------------------------------------------

/// Query daemon status, retrying briefly while the socket comes up (the
/// daemon may still be binding right after `daemon start`).
pub fn request_status(home: &Path) -> Result<DaemonStatusInfo, DaemonError> {
    let mut attempt = 0;
    loop {
        let result =
            DaemonClient::connect(home).and_then(|mut client| client.send(DaemonCommand::Status));
        match result {
            Ok(DaemonReply::Status(info)) => return Ok(info),
            Ok(DaemonReply::Error { message }) => return Err(DaemonError::Protocol(message)),
            Ok(other) => return Err(unexpected_reply(DaemonCommand::Status, &other)),
            Err(DaemonError::DaemonNotRunning { socket }) => {
                if attempt == 4 {
                    return Err(DaemonError::DaemonNotRunning { socket });
                }
                attempt += 1;
                sleep(Duration::from_millis(100));
            }
            Err(err) => return Err(err),
        }
    }
}

pub fn request_stop(home: &Path) -> Result<(), DaemonError> {
    let mut client = DaemonClient::connect(home)?;
    match client.send(DaemonCommand::Stop)? {
        DaemonReply::Stopping => Ok(()),
        DaemonReply::Error { message } => Err(DaemonError::Protocol(message)),
        other => Err(unexpected_reply(DaemonCommand::Stop, &other)),
    }
}

/// Ask the running daemon for a pull reconciliation now.
pub fn request_pull(home: &Path) -> Result<ReconcileSummary, DaemonError> {
    request_reconcile(home, DaemonCommand::Pull)
}

/// Ask the running daemon to push everything, then pull.
pub fn request_push(home: &Path) -> Result<ReconcileSummary, DaemonError> {
    request_reconcile(home, DaemonCommand::Push)
}

fn request_reconcile(
    home: &Path,
    command: DaemonCommand,
) -> Result<ReconcileSummary, DaemonError> {
    let mut client = DaemonClient::connect(home)?;
    match client.send(command)? {
        DaemonReply::Reconciled(summary) => Ok(summary),
        DaemonReply::Error { message } => Err(DaemonError::Protocol(message)),
        other => Err(unexpected_reply(command, &other)),
    }
}

fn unexpected_reply(command: DaemonCommand, reply: &DaemonReply) -> DaemonError {
    DaemonError::Protocol(format!("unexpected reply to {command:?}: {reply:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn commands_are_tagged_json_objects() {
        assert_eq!(
            serde_json::to_string(&DaemonCommand::Pull).unwrap(),
            r#"{"cmd":"pull"}"#
        );
        let parsed: DaemonCommand = serde_json::from_str(r#"{"cmd":"push"}"#).unwrap();
        assert_eq!(parsed, DaemonCommand::Push);
        assert!(serde_json::from_str::<DaemonCommand>(r#"{"cmd":"reload"}"#).is_err());
    }

    #[test]
    fn reconcile_summary_omits_absent_sections() {
        let pull_only = ReconcileSummary::default();
        let line = serde_json::to_string(&pull_only).unwrap();
        assert!(!line.contains("\"revision\""));
        assert!(!line.contains("\"push\""));

        let with_push = ReconcileSummary {
            revision: Some("abc123".to_string()),
            push: Some(PushSummary {
                upserted: 2,
                ..PushSummary::default()
            }),
            pull: PullSummary::default(),
        };
        let parsed: ReconcileSummary =
            serde_json::from_str(&serde_json::to_string(&with_push).unwrap()).unwrap();
        assert_eq!(parsed, with_push);
    }

    #[test]
    fn client_exchanges_one_command_for_one_reply() {
        let (client_end, server_end) = UnixStream::pair().expect("socket pair");

        let server = thread::spawn(move || {
            let mut reader = BufReader::new(server_end);
            let mut line = String::new();
            reader.read_line(&mut line).expect("read command");
            let command: DaemonCommand =
                serde_json::from_str(line.trim_end()).expect("parse command");
            assert_eq!(command, DaemonCommand::Pull);

            let reply = DaemonReply::Reconciled(ReconcileSummary {
                revision: None,
                push: None,
                pull: PullSummary {
                    written: 2,
                    deleted: 0,
                    commit: Some("abc123".to_string()),
                    pushed: true,
                },
            });
            let mut out = serde_json::to_string(&reply).expect("encode reply");
            out.push('\n');
            reader
                .get_mut()
                .write_all(out.as_bytes())
                .expect("write reply");
        });

        let mut client = DaemonClient::over(client_end, PathBuf::from("pair"));
        match client.send(DaemonCommand::Pull).expect("send") {
            DaemonReply::Reconciled(summary) => {
                assert_eq!(summary.pull.written, 2);
                assert_eq!(summary.pull.commit.as_deref(), Some("abc123"));
                assert!(summary.pull.pushed);
            }
            other => panic!("unexpected reply: {other:?}"),
        }
        server.join().expect("server thread");
    }

    #[test]
    fn error_replies_become_protocol_errors() {
        let (client_end, server_end) = UnixStream::pair().expect("socket pair");

        let server = thread::spawn(move || {
            let mut reader = BufReader::new(server_end);
            let mut line = String::new();
            reader.read_line(&mut line).expect("read command");
            let reply = DaemonReply::Error {
                message: "store unreachable".to_string(),
            };
            let mut out = serde_json::to_string(&reply).expect("encode reply");
            out.push('\n');
            reader
                .get_mut()
                .write_all(out.as_bytes())
                .expect("write reply");
        });

        let mut client = DaemonClient::over(client_end, PathBuf::from("pair"));
        let reply = client.send(DaemonCommand::Push).expect("send");
        assert_eq!(
            reply,
            DaemonReply::Error {
                message: "store unreachable".to_string()
            }
        );
        server.join().expect("server thread");
    }
}
