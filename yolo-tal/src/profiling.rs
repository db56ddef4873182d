//! The profiling toolkit that can be disabled in compile-time.
//!
//! Timings are collected only when the `profiling` feature is enabled. The
//! reports are filtered by `YOLOTAL_PROFILING_WHITELIST`, a comma separated
//! list of timing names.

use crate::common::*;

#[cfg(feature = "profiling")]
mod registry {
    use super::ProfilingConfig;
    use dashmap::DashSet;
    use lazy_static::lazy_static;

    lazy_static! {
        pub(super) static ref PROFILING_CONFIG: ProfilingConfig = {
            match envy::prefixed("YOLOTAL_").from_env() {
                Ok(config) => config,
                Err(err) => {
                    log::warn!(
                        "failed to load profiling environment variables, fallback to default values: {:?}",
                        err
                    );
                    Default::default()
                }
            }
        };
        pub(super) static ref REGISTERED_TIMINGS: DashSet<&'static str> = DashSet::new();
    }
}

/// Environment driven profiling options.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfilingConfig {
    pub profiling_whitelist: Option<Vec<String>>,
}

impl ProfilingConfig {
    pub fn can_report(&self, name: &str) -> bool {
        self.profiling_whitelist
            .as_ref()
            .map(|whitelist| whitelist.iter().any(|allowed| allowed == name))
            .unwrap_or(true)
    }
}

#[cfg(feature = "profiling")]
#[derive(Debug)]
pub struct Timing {
    name: &'static str,
    instant: std::time::Instant,
    elapsed: Vec<(&'static str, std::time::Duration)>,
}

#[cfg(not(feature = "profiling"))]
#[derive(Debug)]
pub struct Timing;

impl Timing {
    pub fn new(name: &'static str) -> Self {
        #[cfg(feature = "profiling")]
        {
            if registry::REGISTERED_TIMINGS.insert(name) {
                log::info!("registered timing profile '{}'", name);
            }

            Self {
                name,
                instant: std::time::Instant::now(),
                elapsed: vec![],
            }
        }

        #[cfg(not(feature = "profiling"))]
        {
            let _ = name;
            Self
        }
    }

    pub fn add_event(&mut self, name: &'static str) {
        #[cfg(feature = "profiling")]
        {
            self.elapsed.push((name, self.instant.elapsed()));
            self.instant = std::time::Instant::now();
        }

        #[cfg(not(feature = "profiling"))]
        let _ = name;
    }

    pub fn report(&self) {
        #[cfg(feature = "profiling")]
        {
            if registry::PROFILING_CONFIG.can_report(self.name) {
                log::info!("profiling report for '{}'", self.name);
                self.elapsed.iter().for_each(|(name, elapsed)| {
                    log::info!("- {}\t{:?}", name, elapsed);
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whitelist_filters_reports() {
        let config = ProfilingConfig::default();
        assert!(config.can_report("criterion"));

        let config = ProfilingConfig {
            profiling_whitelist: Some(vec!["assigner".into()]),
        };
        assert!(config.can_report("assigner"));
        assert!(!config.can_report("criterion"));
    }

    #[test]
    fn timing_records_events() {
        let mut timing = Timing::new("test timing");
        timing.add_event("first");
        timing.add_event("second");
        timing.report();
    }
}
