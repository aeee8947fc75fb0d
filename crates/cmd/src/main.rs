// Copyright 2025 Crrow
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::{
    io::{Read, Write},
    path::PathBuf,
    sync::Arc,
    time::Duration,
};

use clap::{Args, Parser, Subcommand};
use courier_common_telemetry::{
    ConsoleTarget, LoggingOptions, init_global_logging, set_panic_hook,
};
use queue::{FileLock, Lock, Queue, QueueBuilder, QueueConfig, QueueMessage, SendOptions};
use snafu::{ResultExt, Whatever, whatever};

/// Subdirectory of the base path holding the channel lock files.
const LOCK_DIR: &str = "locks";

#[derive(Debug, Parser)]
#[clap(
name = "courier",
about = "Inspect and drive a courier queue directory",
author = env!("CARGO_PKG_AUTHORS"),
version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// Log level filter. Logs go to stderr, payloads to stdout.
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    commands: Commands,
}

impl Cli {
    fn logging_options(&self) -> LoggingOptions {
        LoggingOptions::builder()
            .level(self.log_level.clone())
            .console(ConsoleTarget::Stderr)
            .build()
    }
}

#[derive(Debug, Subcommand)]
enum Commands {
    Send(SendArgs),
    Receive(ReceiveArgs),
    Clear(ClearArgs),
    Inspect(InspectArgs),
}

/// Options shared by every subcommand for opening the queue.
#[derive(Debug, Clone, Args)]
struct QueueArgs {
    /// JSON file with `QueueConfig` fields. Flags override it.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory holding the channel files.
    #[arg(long)]
    base_path: Option<PathBuf>,

    /// Default delay in seconds for messages sent without `--delay`.
    #[arg(long)]
    default_delay: Option<u32>,

    /// Default priority for messages sent without `--priority`.
    #[arg(long)]
    default_priority: Option<u32>,

    /// Default TTR in seconds for messages sent without `--ttr`.
    #[arg(long)]
    default_ttr: Option<u32>,

    /// Longest wait for the channel lock, in milliseconds.
    #[arg(long)]
    lock_timeout_ms: Option<u64>,
}

impl QueueArgs {
    fn load_config(&self) -> Result<QueueConfig, Whatever> {
        let mut config = match &self.config {
            Some(path) => {
                let raw = std::fs::read_to_string(path).with_whatever_context(|_| {
                    format!("failed to read config {}", path.display())
                })?;
                serde_json::from_str(&raw).with_whatever_context(|_| {
                    format!("failed to parse config {}", path.display())
                })?
            }
            None => QueueConfig::default(),
        };

        if let Some(base_path) = &self.base_path {
            config.base_path.clone_from(base_path);
        }
        if let Some(delay) = self.default_delay {
            config.delay = delay;
        }
        if let Some(priority) = self.default_priority {
            config.priority = priority;
        }
        if let Some(ttr) = self.default_ttr {
            config.ttr = ttr;
        }
        if let Some(ms) = self.lock_timeout_ms {
            config.lock_timeout = Duration::from_millis(ms);
        }
        Ok(config)
    }

    /// Opens the queue with cross-process file locks, so several `courier`
    /// invocations can share one directory.
    fn open(&self) -> Result<Queue, Whatever> {
        let config = self.load_config()?;
        let lock = FileLock::new(config.base_path.join(LOCK_DIR));
        QueueBuilder::new(config.base_path.clone())
            .config(config)
            .lock(Arc::new(lock) as Arc<dyn Lock>)
            .build()
            .whatever_context("failed to open queue")
    }
}

#[derive(Debug, Clone, Args)]
#[command(flatten_help = true)]
#[command(long_about = r"

Send a message to a channel. The payload is stored as raw bytes.
Examples:

courier send jobs 'hello'
courier send jobs 'resize image 42' --priority 10 --ttr 60
echo 'from stdin' | courier send jobs -

")]
struct SendArgs {
    #[command(flatten)]
    queue: QueueArgs,

    channel: String,

    /// Payload text, or `-` to read it from stdin.
    payload: String,

    /// Seconds before the message becomes visible.
    #[arg(long)]
    delay: Option<u32>,

    /// Lower values are received first.
    #[arg(long)]
    priority: Option<u32>,

    /// Seconds a visible message may wait before it is dropped.
    #[arg(long)]
    ttr: Option<u32>,
}

impl SendArgs {
    fn payload(&self) -> Result<Vec<u8>, Whatever> {
        if self.payload != "-" {
            return Ok(self.payload.clone().into_bytes());
        }
        let mut buf = Vec::new();
        std::io::stdin()
            .read_to_end(&mut buf)
            .whatever_context("failed to read payload from stdin")?;
        Ok(buf)
    }

    fn run(&self) -> Result<(), Whatever> {
        let queue = self.queue.open()?;
        let payload = self.payload()?;
        let options = SendOptions {
            delay:    self.delay,
            priority: self.priority,
            ttr:      self.ttr,
        };
        let pending = queue
            .send_raw(&self.channel, &payload, options)
            .with_whatever_context(|_| format!("failed to send to {}", self.channel))?;
        println!("{pending}");
        Ok(())
    }
}

#[derive(Debug, Clone, Args)]
#[command(flatten_help = true)]
#[command(long_about = r"

Receive the next ready message of a channel and print it.
Exits with status 1 when no message is ready.
Examples:

courier receive jobs

")]
struct ReceiveArgs {
    #[command(flatten)]
    queue: QueueArgs,

    channel: String,
}

impl ReceiveArgs {
    fn run(&self) -> Result<(), Whatever> {
        let queue = self.queue.open()?;
        let Some(payload) = queue
            .receive_raw(&self.channel)
            .with_whatever_context(|_| format!("failed to receive from {}", self.channel))?
        else {
            whatever!("no ready message on {}", self.channel);
        };

        let mut stdout = std::io::stdout().lock();
        stdout
            .write_all(&payload)
            .and_then(|()| stdout.write_all(b"\n"))
            .whatever_context("failed to write payload")
    }
}

#[derive(Debug, Clone, Args)]
#[command(flatten_help = true)]
#[command(long_about = r"

Delete every message of a channel together with its files.
Examples:

courier clear jobs

")]
struct ClearArgs {
    #[command(flatten)]
    queue: QueueArgs,

    channel: String,
}

impl ClearArgs {
    fn run(&self) -> Result<(), Whatever> {
        let queue = self.queue.open()?;
        queue
            .clear(&self.channel)
            .with_whatever_context(|_| format!("failed to clear {}", self.channel))
    }
}

#[derive(Debug, Clone, Args)]
#[command(flatten_help = true)]
#[command(long_about = r"

Print pending, ready and delayed counts of a channel as JSON.
Expired messages are dropped first.
Examples:

courier inspect jobs

")]
struct InspectArgs {
    #[command(flatten)]
    queue: QueueArgs,

    channel: String,
}

impl InspectArgs {
    fn run(&self) -> Result<(), Whatever> {
        let queue = self.queue.open()?;
        let stats = queue
            .stats(&self.channel)
            .with_whatever_context(|_| format!("failed to inspect {}", self.channel))?;
        let json = serde_json::to_string_pretty(&stats).whatever_context("failed to render")?;
        println!("{json}");
        Ok(())
    }
}

fn main() -> Result<(), Whatever> {
    human_panic::setup_panic!();
    let cli = Cli::parse();

    let logging = cli.logging_options();
    let _guards = init_global_logging("courier", &logging).whatever_context("logging")?;
    set_panic_hook();

    match cli.commands {
        Commands::Send(args) => args.run(),
        Commands::Receive(args) => args.run(),
        Commands::Clear(args) => args.run(),
        Commands::Inspect(args) => args.run(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_send() {
        let cli = Cli::parse_from([
            "courier",
            "send",
            "--base-path",
            "/tmp/q",
            "jobs",
            "hello",
            "--priority",
            "10",
        ]);
        let Commands::Send(args) = cli.commands else {
            panic!("expected send");
        };
        assert_eq!(args.channel, "jobs");
        assert_eq!(args.payload, "hello");
        assert_eq!(args.priority, Some(10));
        assert_eq!(args.queue.base_path, Some(PathBuf::from("/tmp/q")));
    }

    #[test]
    fn test_logs_stay_off_stdout() {
        let cli = Cli::parse_from(["courier", "--log-level", "debug", "receive", "jobs"]);
        let logging = cli.logging_options();
        assert_eq!(logging.console, ConsoleTarget::Stderr);
        assert_eq!(logging.level.as_deref(), Some("debug"));
        assert!(logging.dir.is_empty());
    }

    #[test]
    fn test_flags_override_config_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config_path = temp_dir.path().join("courier.json");
        std::fs::write(
            &config_path,
            r#"{"base_path": "/srv/queue", "priority": 7, "lock_timeout": "250ms"}"#,
        )
        .unwrap();

        let args = QueueArgs {
            config:           Some(config_path),
            base_path:        None,
            default_delay:    None,
            default_priority: Some(1),
            default_ttr:      Some(9),
            lock_timeout_ms:  None,
        };
        let config = args.load_config().unwrap();
        assert_eq!(config.base_path, PathBuf::from("/srv/queue"));
        assert_eq!(config.priority, 1);
        assert_eq!(config.ttr, 9);
        assert_eq!(config.lock_timeout, Duration::from_millis(250));
    }

    #[test]
    fn test_commands_share_a_directory() {
        let temp_dir = tempfile::tempdir().unwrap();
        let queue_args = QueueArgs {
            config:           None,
            base_path:        Some(temp_dir.path().to_path_buf()),
            default_delay:    None,
            default_priority: None,
            default_ttr:      None,
            lock_timeout_ms:  Some(500),
        };

        SendArgs {
            queue:    queue_args.clone(),
            channel:  "jobs".to_string(),
            payload:  "hello".to_string(),
            delay:    None,
            priority: Some(10),
            ttr:      Some(5),
        }
        .run()
        .unwrap();

        let queue = queue_args.open().unwrap();
        assert_eq!(queue.stats("jobs").unwrap().pending, 1);
        assert_eq!(
            queue.receive_raw("jobs").unwrap().as_deref(),
            Some(&b"hello"[..])
        );
        assert!(temp_dir.path().join(LOCK_DIR).is_dir());
    }
}
