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

// Wires the command line onto the engine: loads the rule files, opens the
// capture and drives the dispatcher until the capture ends or a signal
// arrives.

use std::io;
use std::path::PathBuf;
use std::sync::{atomic::AtomicBool, Arc, Weak};

use anyhow::{Context, Result};
use log::{info, warn};

use crate::config::{Config, ConfigError};
use crate::dispatcher::{Dispatcher, DispatcherConfig, PcapSource};
use crate::flow_generator::{
    CategoryMap, Classifier, CustomProtocols, ProtocolRegistry, RuleBasedIdentifier,
};
use crate::handler::FlowPrinter;
use crate::policy::RuleSet;
use crate::utils::stats::{Collector, Countable, RefCountable};

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunOptions {
    pub device: String,
    pub bpf_filter: Option<String>,
    pub l7: bool,
    pub rules_file: Option<PathBuf>,
    pub protocols_file: Option<PathBuf>,
    pub categories_file: Option<PathBuf>,
    pub verbose: bool,
    pub quiet: bool,
    pub config_file: Option<PathBuf>,
}

impl RunOptions {
    // Custom protocols and rules are expressed in l7 terms and turn
    // identification on by themselves.
    pub fn l7_enabled(&self) -> bool {
        self.l7 || self.protocols_file.is_some() || self.rules_file.is_some()
    }
}

// Everything loaded from files before the capture is opened.
struct Setup {
    config: Config,
    registry: ProtocolRegistry,
    identifier: Option<RuleBasedIdentifier>,
    rules: Option<RuleSet>,
}

fn load_setup(opts: &RunOptions) -> Result<Setup> {
    let config = match opts.config_file.as_ref() {
        Some(path) => Config::load_from_file(path)
            .with_context(|| format!("Failure loading config from {}", path.display()))?,
        None => Config::default(),
    };

    let l7 = opts.l7_enabled();
    if opts.categories_file.is_some() && !l7 {
        return Err(ConfigError::CategoriesRequireL7.into());
    }

    let mut registry = ProtocolRegistry::default();
    let custom = match opts.protocols_file.as_ref() {
        Some(path) => CustomProtocols::load_from_file(path, &mut registry)
            .with_context(|| format!("Failure loading custom protocols from {}", path.display()))?,
        None => CustomProtocols::default(),
    };
    let categories = match opts.categories_file.as_ref() {
        Some(path) => CategoryMap::load_from_file(path)
            .with_context(|| format!("Failure loading categories from {}", path.display()))?,
        None => CategoryMap::default(),
    };
    // rules may name custom protocols, load them last
    let rules = match opts.rules_file.as_ref() {
        Some(path) => Some(
            RuleSet::load_from_file(path, &registry)
                .with_context(|| format!("Failure loading rules from {}", path.display()))?,
        ),
        None => None,
    };

    Ok(Setup {
        config,
        registry,
        identifier: l7.then(|| RuleBasedIdentifier::new(custom, categories)),
        rules,
    })
}

pub fn run(opts: &RunOptions, terminated: Arc<AtomicBool>, mut collector: Collector) -> Result<()> {
    let Setup {
        config,
        registry,
        identifier,
        rules,
    } = load_setup(opts)?;
    let l7 = identifier.is_some();

    let mut source = PcapSource::open(&opts.device, &config.capture)?;
    if let Some(filter) = opts.bpf_filter.as_ref() {
        if let Err(e) = source.set_filter(filter) {
            warn!("set bpf filter \"{}\" failed: {}", filter, e);
        }
    }

    if !opts.quiet {
        println!(
            "Capturing from {} {} L7 support",
            opts.device,
            if l7 { "with" } else { "without (see -7)" }
        );
    }

    let exporter = FlowPrinter::new(io::stdout(), registry, l7);
    let mut classifier = Classifier::new(config.flow_map_config(l7), exporter);
    if let Some(identifier) = identifier {
        classifier = classifier.with_identifier(Box::new(identifier));
    }
    if let Some(rules) = rules {
        classifier = classifier.with_filter(Box::new(rules));
    }

    collector.register_countable(
        "classifier",
        Countable::Ref(Arc::downgrade(classifier.counter()) as Weak<dyn RefCountable>),
        vec![],
    );
    collector.register_countable(
        "flow_map",
        Countable::Ref(Arc::downgrade(classifier.flow_map_counter()) as Weak<dyn RefCountable>),
        vec![],
    );

    let dispatcher_config = DispatcherConfig {
        verbose: opts.verbose,
        report_stats: !opts.verbose && !opts.quiet,
        stats_interval: config.stats_interval,
    };
    let mut dispatcher =
        Dispatcher::new(classifier, terminated, dispatcher_config).with_collector(collector);
    dispatcher.run(&mut source)?;
    info!("capture from {} finished", opts.device);
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    use super::*;

    use crate::common::enums::TcpFlags;
    use crate::utils::test::*;

    fn opts() -> RunOptions {
        RunOptions {
            device: "ftflow-test0".to_owned(),
            quiet: true,
            ..Default::default()
        }
    }

    fn file_with(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn l7_implied_by_rule_files() {
        let mut o = opts();
        assert!(!o.l7_enabled());
        o.protocols_file = Some("/tmp/protos.txt".into());
        assert!(o.l7_enabled());

        let mut o = opts();
        o.rules_file = Some("/tmp/rules.yaml".into());
        assert!(o.l7_enabled());

        // categories alone do not
        let mut o = opts();
        o.categories_file = Some("/tmp/categories.txt".into());
        assert!(!o.l7_enabled());
    }

    #[test]
    fn categories_require_l7() {
        let categories = file_with("10.0.0.0/8 Cloud\n");
        let mut o = opts();
        o.categories_file = Some(categories.path().to_owned());
        let e = load_setup(&o).err().unwrap();
        assert!(matches!(
            e.downcast_ref::<ConfigError>(),
            Some(ConfigError::CategoriesRequireL7)
        ));
        assert_eq!(
            e.to_string(),
            "Categories detection require L7 detection (please use -c in combination with -7)"
        );

        o.l7 = true;
        let setup = load_setup(&o).unwrap();
        assert!(setup.identifier.is_some());
    }

    #[test]
    fn loader_failures_name_the_file() {
        let mut o = opts();
        o.protocols_file = Some("/nonexistent/protos.txt".into());
        assert_eq!(
            load_setup(&o).err().unwrap().to_string(),
            "Failure loading custom protocols from /nonexistent/protos.txt"
        );

        let mut o = opts();
        o.l7 = true;
        o.categories_file = Some("/nonexistent/categories.txt".into());
        assert_eq!(
            load_setup(&o).err().unwrap().to_string(),
            "Failure loading categories from /nonexistent/categories.txt"
        );

        let rules = file_with("filter:\n  - action: discard\n");
        let mut o = opts();
        o.rules_file = Some(rules.path().to_owned());
        assert_eq!(
            load_setup(&o).err().unwrap().to_string(),
            format!("Failure loading rules from {}", rules.path().display())
        );
    }

    #[test]
    fn rules_see_custom_protocols() {
        let protocols = file_with("tcp:9999@Acme\n");
        let rules = file_with("filter:\n  - protocol: Acme\n    action: discard\n");
        let mut o = opts();
        o.protocols_file = Some(protocols.path().to_owned());
        o.rules_file = Some(rules.path().to_owned());
        let setup = load_setup(&o).unwrap();
        assert!(setup.identifier.is_some());
        assert!(setup.rules.is_some());
        assert!(setup.registry.lookup("acme").is_some());
    }

    #[test]
    fn bad_config_file() {
        let config = file_with("flow-table:\n  max-flows: 0\n");
        let mut o = opts();
        o.config_file = Some(config.path().to_owned());
        let e = load_setup(&o).err().unwrap();
        assert!(e
            .to_string()
            .starts_with("Failure loading config from"));
    }

    #[test]
    fn open_failure_is_fatal() {
        let mut o = opts();
        o.device = "/nonexistent/capture.pcap".to_owned();
        let e = run(&o, Arc::new(AtomicBool::new(false)), Collector::default())
            .err()
            .unwrap();
        assert!(matches!(
            e.downcast_ref::<crate::dispatcher::Error>(),
            Some(crate::dispatcher::Error::OpenFailed { .. })
        ));
    }

    #[test]
    fn replay_capture_file() {
        let packets = vec![
            (
                Duration::from_secs(10),
                tcp_v4_packet("10.0.0.1", 40000, "10.0.0.2", 80, TcpFlags::SYN, &[]),
            ),
            (
                Duration::from_millis(10_100),
                tcp_v4_packet("10.0.0.2", 80, "10.0.0.1", 40000, TcpFlags::SYN_ACK, &[]),
            ),
        ];
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&pcap_file(&packets)).unwrap();

        let mut o = opts();
        o.device = file.path().display().to_string();
        o.l7 = true;
        let terminated = Arc::new(AtomicBool::new(false));
        run(&o, terminated.clone(), Collector::default()).unwrap();
        assert!(!terminated.load(Ordering::Relaxed));
    }
}
