//! Stockfish engine wrapper using UCI protocol (async I/O)

use std::path::Path;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::time::timeout;

use tracing::{debug, warn};

use crate::analysis::Evaluation;
use crate::error::WorkerError;

/// Extra wall-clock allowance on top of the movetime before a search is
/// considered hung.
const WATCHDOG_GRACE: Duration = Duration::from_secs(2);

/// Time to wait for `bestmove` after sending `stop`.
const STOP_GRACE: Duration = Duration::from_secs(1);

/// Result of a single position evaluation
#[derive(Debug, Clone, Default)]
pub struct EvalResult {
    /// Centipawn score (from engine's perspective, i.e., side to move)
    pub cp: Option<i32>,
    /// Mate in N moves (positive = engine wins, negative = engine loses)
    pub mate: Option<i32>,
    /// Best move in UCI notation (`(none)` in terminal positions)
    pub best_move: String,
}

impl EvalResult {
    pub fn evaluation(&self) -> Option<Evaluation> {
        match (self.mate, self.cp) {
            (Some(m), _) => Some(Evaluation::Mate(m)),
            (None, Some(c)) => Some(Evaluation::Centipawns(c)),
            (None, None) => None,
        }
    }
}

/// Search bound per position: whichever of depth and movetime is hit first.
#[derive(Debug, Clone, Copy)]
pub struct SearchLimit {
    pub depth: u32,
    pub movetime: Duration,
}

impl SearchLimit {
    fn go_command(&self) -> String {
        format!("go depth {} movetime {}", self.depth, self.movetime.as_millis())
    }

    fn deadline(&self) -> Duration {
        self.movetime + WATCHDOG_GRACE
    }
}

/// Stockfish engine instance
pub struct StockfishEngine {
    process: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
}

impl StockfishEngine {
    /// Spawn a new Stockfish process and initialize UCI
    pub async fn new(path: &Path) -> Result<Self, WorkerError> {
        let mut process = Command::new(path)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| WorkerError::Stockfish(format!("Failed to spawn Stockfish: {e}")))?;

        let stdin = process
            .stdin
            .take()
            .ok_or_else(|| WorkerError::Stockfish("Stockfish stdin unavailable".into()))?;
        let stdout = process
            .stdout
            .take()
            .map(BufReader::new)
            .ok_or_else(|| WorkerError::Stockfish("Stockfish stdout unavailable".into()))?;

        let mut engine = Self {
            process,
            stdin,
            stdout,
        };

        // Initialize UCI
        let handshake = async {
            engine.send("uci").await?;
            engine.wait_for("uciok").await?;

            engine.send("setoption name Threads value 1").await?;
            engine.send("setoption name Hash value 256").await?;
            engine.send("isready").await?;
            engine.wait_for("readyok").await?;
            Ok::<(), WorkerError>(())
        };
        timeout(Duration::from_secs(10), handshake)
            .await
            .map_err(|_| WorkerError::Stockfish("UCI handshake timed out".into()))??;

        Ok(engine)
    }

    /// Send a command to Stockfish
    async fn send(&mut self, cmd: &str) -> Result<(), WorkerError> {
        debug!(cmd, "SF <");
        self.stdin
            .write_all(format!("{cmd}\n").as_bytes())
            .await
            .map_err(|e| WorkerError::EngineExited(format!("Failed to write to Stockfish: {e}")))?;
        self.stdin
            .flush()
            .await
            .map_err(|e| WorkerError::EngineExited(format!("Failed to flush stdin: {e}")))?;
        Ok(())
    }

    /// Read one line; end of stream means the process is gone.
    async fn read_line(&mut self, line: &mut String) -> Result<(), WorkerError> {
        line.clear();
        let n = self
            .stdout
            .read_line(line)
            .await
            .map_err(|e| WorkerError::EngineExited(format!("Failed to read from Stockfish: {e}")))?;
        if n == 0 {
            return Err(WorkerError::EngineExited("Stockfish closed its output".into()));
        }
        debug!(line = line.trim(), "SF >");
        Ok(())
    }

    /// Wait for a specific response line
    async fn wait_for(&mut self, expected: &str) -> Result<(), WorkerError> {
        let mut line = String::new();
        loop {
            self.read_line(&mut line).await?;
            if line.trim() == expected {
                return Ok(());
            }
        }
    }

    /// Read search output up to `bestmove`, keeping the last reported score.
    async fn read_search(&mut self) -> Result<EvalResult, WorkerError> {
        let mut result = EvalResult::default();
        let mut line = String::new();

        loop {
            self.read_line(&mut line).await?;
            let trimmed = line.trim();

            if trimmed.starts_with("info") && trimmed.contains(" score ") {
                if let Some(cp) = parse_cp(trimmed) {
                    result.cp = Some(cp);
                    result.mate = None;
                }
                if let Some(mate) = parse_mate(trimmed) {
                    result.mate = Some(mate);
                    result.cp = None;
                }
            } else if trimmed.starts_with("bestmove") {
                if let Some(mv) = trimmed.split_whitespace().nth(1) {
                    result.best_move = mv.to_string();
                }
                return Ok(result);
            }
        }
    }

    /// Evaluate a position within `limit`.
    ///
    /// A search that overruns the limit is stopped and reported as a
    /// timeout; an engine that does not answer `stop` is treated as exited.
    pub async fn evaluate(&mut self, fen: &str, limit: &SearchLimit) -> Result<EvalResult, WorkerError> {
        self.send(&format!("position fen {fen}")).await?;
        self.send(&limit.go_command()).await?;

        match timeout(limit.deadline(), self.read_search()).await {
            Ok(result) => result,
            Err(_) => {
                warn!(fen, "Search overran its limit, stopping");
                self.send("stop").await?;
                match timeout(STOP_GRACE, self.read_search()).await {
                    Ok(Ok(_)) => Err(WorkerError::Timeout(limit.deadline())),
                    Ok(Err(e)) => Err(e),
                    Err(_) => Err(WorkerError::EngineExited("Stockfish ignored stop".into())),
                }
            }
        }
    }

    /// Send quit command and wait for process to exit
    pub async fn quit(&mut self) {
        let _ = self.send("quit").await;
        if timeout(Duration::from_secs(2), self.process.wait()).await.is_err() {
            let _ = self.process.start_kill();
        }
    }
}

impl Drop for StockfishEngine {
    fn drop(&mut self) {
        // Best-effort synchronous kill in drop
        let _ = self.process.start_kill();
    }
}

/// Parse centipawn score from info line
fn parse_cp(line: &str) -> Option<i32> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    for (i, part) in parts.iter().enumerate() {
        if *part == "cp" && i + 1 < parts.len() {
            return parts[i + 1].parse().ok();
        }
    }
    None
}

/// Parse mate score from info line
fn parse_mate(line: &str) -> Option<i32> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    for (i, part) in parts.iter().enumerate() {
        if *part == "mate" && i + 1 < parts.len() {
            return parts[i + 1].parse().ok();
        }
    }
    None
}
