/*
 * Copyright (c) 2022 Yunshan Networks
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 *     http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 */

use std::path::PathBuf;
use std::process;
use std::sync::{atomic::AtomicBool, Arc};

use clap::{ArgAction, CommandFactory, Parser};
use log::error;
use signal_hook::{consts::TERM_SIGNALS, flag};

use ::ftflow::{
    runner::{self, RunOptions},
    utils::{
        logger,
        stats::{Collector, Countable},
    },
};

/// Flow tracking and protocol detection on a live interface or a capture file
#[derive(Parser)]
struct Opts {
    /// Device name or PCAP file
    #[clap(short = 'i', value_name = "device")]
    device: Option<String>,

    /// BPF filter
    #[clap(short = 'f', value_name = "filter")]
    bpf_filter: Option<String>,

    /// Enable L7 protocol detection
    #[clap(short = '7', action = ArgAction::SetTrue)]
    l7: bool,

    /// Load filtering/shunting rules from file
    #[clap(short = 'F', value_name = "file")]
    rules_file: Option<PathBuf>,

    /// Load custom protocols from file
    #[clap(short = 'p', value_name = "file")]
    protocols_file: Option<PathBuf>,

    /// Load categories by host from file
    #[clap(short = 'c', value_name = "file")]
    categories_file: Option<PathBuf>,

    /// Debug mode
    #[clap(short = 'd', action = ArgAction::SetTrue)]
    debug: bool,

    /// Quiet mode
    #[clap(short = 'q', action = ArgAction::SetTrue)]
    quiet: bool,

    /// Verbose
    #[clap(short = 'v', action = ArgAction::SetTrue)]
    verbose: bool,

    /// Load engine tunables from a yaml file
    #[clap(long = "config", value_name = "file")]
    config_file: Option<PathBuf>,
}

impl Opts {
    fn into_run_options(self, device: String) -> RunOptions {
        RunOptions {
            device,
            bpf_filter: self.bpf_filter,
            l7: self.l7,
            rules_file: self.rules_file,
            protocols_file: self.protocols_file,
            categories_file: self.categories_file,
            verbose: self.verbose,
            quiet: self.quiet,
            config_file: self.config_file,
        }
    }
}

fn main() {
    let mut opts = Opts::parse();
    let Some(device) = opts.device.take() else {
        let _ = Opts::command().print_help();
        process::exit(-1);
    };

    let (_logger, log_level_counter) = match logger::init(opts.debug) {
        Ok(l) => l,
        Err(e) => {
            eprintln!("logger init failed: {}", e);
            process::exit(-1);
        }
    };
    let mut collector = Collector::default();
    collector.register_countable(
        "log_counter",
        Countable::Owned(Box::new(log_level_counter)),
        vec![],
    );

    let terminated = Arc::new(AtomicBool::new(false));
    for signal in TERM_SIGNALS {
        if let Err(e) = flag::register(*signal, terminated.clone()) {
            error!("register signal {} failed: {}", signal, e);
            process::exit(-1);
        }
    }

    if let Err(e) = runner::run(&opts.into_run_options(device), terminated, collector) {
        error!("{:#}", e);
        process::exit(-1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_cli() {
        Opts::command().debug_assert();
    }

    #[test]
    fn short_flags() {
        let opts = Opts::try_parse_from([
            "ftflow-pcap", "-i", "eth0", "-7", "-f", "tcp port 80", "-F", "rules.yaml", "-q",
        ])
        .unwrap();
        assert!(opts.l7 && opts.quiet && !opts.verbose && !opts.debug);
        assert_eq!(opts.bpf_filter.as_deref(), Some("tcp port 80"));
        let run = opts.into_run_options("eth0".to_owned());
        assert_eq!(run.device, "eth0");
        assert_eq!(run.rules_file, Some(PathBuf::from("rules.yaml")));
        assert!(run.l7_enabled());

        let opts = Opts::try_parse_from(["ftflow-pcap"]).unwrap();
        assert!(opts.device.is_none());
    }
}
