// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! Invocation of the external candidate miner.
//!
//! The miner is a blocking subprocess. Its exit status is not inspected:
//! success is judged by the result file it leaves behind. A miner that runs
//! past its timeout is killed and the hint iteration is skipped.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use crate::config::DistillConfig;
use crate::error::DistillError;
use crate::hint::Hint;

/// How to start the miner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MinerConf {
    pub program: PathBuf,
    /// Extra arguments placed before the generated ones.
    pub args: Vec<String>,
    pub timeout: Duration,
}

impl Default for MinerConf {
    fn default() -> Self {
        Self {
            program: PathBuf::from("pinfer-miner"),
            args: vec![],
            timeout: Duration::from_secs(30 * 60),
        }
    }
}

/// How a miner run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MinerStatus {
    Finished,
    TimedOut,
}

fn ids(flag: &str, ids: &[usize], args: &mut Vec<String>) {
    if ids.is_empty() {
        return;
    }
    args.push(flag.to_string());
    args.extend(ids.iter().map(|i| i.to_string()));
}

/// The argument list for one miner run of `hint` at its current
/// arity/guards/filters combination.
pub fn miner_args(
    cfg: &DistillConfig,
    hint: &Hint,
    guard_ids: &[usize],
    filter_ids: &[usize],
    traces: &[PathBuf],
) -> Vec<String> {
    let mut args = cfg.miner.args.clone();
    let path = |p: &Path| p.display().to_string();
    if hint.existentials() > 0 {
        let nforall = hint.events().len() - hint.existentials();
        args.extend([
            "-nforall".to_string(),
            nforall.to_string(),
            "-fd".to_string(),
            hint.num_filters.to_string(),
        ]);
    }
    args.extend(["-gd".to_string(), hint.num_guards.to_string(), "-st".to_string()]);
    args.extend(["-p".to_string(), path(&cfg.predicates_file())]);
    args.extend(["-t".to_string(), path(&cfg.terms_file())]);
    ids("-g", guard_ids, &mut args);
    ids("-f", filter_ids, &mut args);
    args.extend(["-nt".to_string(), hint.arity.to_string()]);
    args.extend(["-O".to_string(), cfg.pruning_level.to_string()]);
    if cfg.verbose {
        args.push("-v".to_string());
    }
    args.extend(["-o".to_string(), path(&cfg.mining_dir())]);
    if !traces.is_empty() {
        args.push("-l".to_string());
        args.extend(traces.iter().map(|t| path(t)));
    }
    args
}

/// Run the miner to completion or until its timeout.
pub fn run(conf: &MinerConf, args: &[String]) -> Result<MinerStatus, DistillError> {
    let cmd = conf.program.display().to_string();
    log::debug!("running {cmd} {}", args.join(" "));
    let start = Instant::now();
    let mut child = Command::new(&conf.program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::inherit())
        .spawn()
        .map_err(|err| DistillError::Miner {
            cmd: cmd.clone(),
            err,
        })?;
    let mut poll = Duration::from_millis(10);
    loop {
        match child.try_wait() {
            Ok(Some(status)) => {
                let elapsed = humantime::format_duration(round(start.elapsed()));
                log::debug!("miner finished in {elapsed} ({status})");
                return Ok(MinerStatus::Finished);
            }
            Ok(None) => {}
            Err(err) => return Err(DistillError::Miner { cmd, err }),
        }
        if start.elapsed() >= conf.timeout {
            log::warn!(
                "miner timed out after {}, killing it",
                humantime::format_duration(conf.timeout)
            );
            // the process may have exited in between
            let _ = child.kill();
            let _ = child.wait();
            return Ok(MinerStatus::TimedOut);
        }
        thread::sleep(poll);
        poll = (poll * 2).min(Duration::from_millis(500));
    }
}

/// Durations to the millisecond, which is all a log line needs.
pub(crate) fn round(d: Duration) -> Duration {
    Duration::from_millis(d.as_millis() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hint(existentials: usize) -> Hint {
        let events = vec!["eReq".to_string(), "eResp".to_string()];
        Hint::new("h", events, existentials, None).unwrap()
    }

    #[test]
    fn test_args() {
        let cfg = DistillConfig {
            project: "proj".to_string(),
            output_dir: PathBuf::from("out"),
            verbose: true,
            ..Default::default()
        };
        let mut h = hint(1);
        h.num_guards = 1;
        h.num_filters = 2;
        h.arity = 2;
        let args = miner_args(&cfg, &h, &[3, 4], &[], &[PathBuf::from("t/0.json")]);
        assert_eq!(
            args.join(" "),
            "-nforall 1 -fd 2 -gd 1 -st -p out/proj.predicates.json -t out/proj.terms.json \
             -g 3 4 -nt 2 -O 3 -v -o out/mining -l t/0.json"
        );

        let cfg = DistillConfig {
            output_dir: PathBuf::from("out"),
            ..Default::default()
        };
        let args = miner_args(&cfg, &hint(0), &[], &[1], &[]);
        assert_eq!(
            args.join(" "),
            "-gd 0 -st -p out/project.predicates.json -t out/project.terms.json -f 1 -nt 1 -O 3 -o out/mining"
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_run() {
        let quick = MinerConf {
            program: PathBuf::from("true"),
            ..Default::default()
        };
        assert_eq!(run(&quick, &[]).unwrap(), MinerStatus::Finished);

        let slow = MinerConf {
            program: PathBuf::from("sleep"),
            args: vec![],
            timeout: Duration::from_millis(100),
        };
        assert_eq!(run(&slow, &["5".to_string()]).unwrap(), MinerStatus::TimedOut);

        let missing = MinerConf {
            program: PathBuf::from("/nonexistent/miner"),
            ..Default::default()
        };
        assert!(matches!(run(&missing, &[]), Err(DistillError::Miner { .. })));
    }
}
