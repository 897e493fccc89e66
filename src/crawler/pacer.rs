//! Per-origin politeness: delays and concurrency ceilings

use crate::config::{Config, OriginPolicy};
use rand::Rng;
use std::collections::HashMap;
use std::time::Duration;

/// Computes how long to wait before the next request to an origin
#[derive(Debug, Clone)]
pub struct Pacer {
    default_delay: Duration,
    default_concurrency: usize,
    randomize: bool,
    range: (f64, f64),
    policies: HashMap<String, OriginPolicy>,
}

impl Pacer {
    pub fn new(config: &Config) -> Self {
        Self {
            default_delay: secs(config.crawler.default_delay_secs),
            default_concurrency: 1,
            randomize: config.crawler.randomize_delay,
            range: config.crawler.delay_range,
            policies: config
                .origins
                .iter()
                .map(|p| (p.host.to_lowercase(), p.clone()))
                .collect(),
        }
    }

    /// Delay to apply before the next request to `origin`
    ///
    /// With randomization on, the delay is drawn from the configured range
    /// and replaces the base delay.
    pub fn delay_for_origin(&self, origin: &str) -> Duration {
        if self.randomize {
            let (min, max) = self.range;
            if max > min {
                return secs(rand::thread_rng().gen_range(min..=max));
            }
            return secs(min);
        }

        self.base_delay(origin)
    }

    /// Configured delay for `origin`, ignoring randomization
    pub fn base_delay(&self, origin: &str) -> Duration {
        self.policies
            .get(origin)
            .map(|p| secs(p.delay_secs))
            .unwrap_or(self.default_delay)
    }

    /// Maximum number of concurrent requests to `origin`
    ///
    /// Origins without a declared policy get one request at a time.
    pub fn max_concurrency(&self, origin: &str) -> usize {
        self.policies
            .get(origin)
            .map(|p| p.max_concurrent.max(1))
            .unwrap_or(self.default_concurrency)
    }
}

fn secs(value: f64) -> Duration {
    Duration::try_from_secs_f64(value).unwrap_or(Duration::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(randomize: bool) -> Config {
        let mut config = Config::default();
        config.crawler.randomize_delay = randomize;
        config.crawler.default_delay_secs = 2.5;
        config.crawler.delay_range = (4.0, 6.0);
        config
    }

    #[test]
    fn test_origin_specific_delay() {
        let pacer = Pacer::new(&config(false));
        assert_eq!(
            pacer.delay_for_origin("www.msdvetmanual.com"),
            Duration::from_secs(7)
        );
        assert_eq!(
            pacer.delay_for_origin("www.msdmanuals.cn"),
            Duration::from_secs(6)
        );
    }

    #[test]
    fn test_default_delay_for_unknown_origin() {
        let pacer = Pacer::new(&config(false));
        assert_eq!(
            pacer.delay_for_origin("unknown.test"),
            Duration::from_millis(2500)
        );
    }

    #[test]
    fn test_randomized_delay_overrides_base() {
        let pacer = Pacer::new(&config(true));
        for _ in 0..50 {
            let delay = pacer.delay_for_origin("www.msdvetmanual.com");
            assert!(delay >= Duration::from_secs(4), "{:?}", delay);
            assert!(delay <= Duration::from_secs(6), "{:?}", delay);
        }
    }

    #[test]
    fn test_degenerate_range_gives_fixed_delay() {
        let mut config = config(true);
        config.crawler.delay_range = (0.0, 0.0);
        let pacer = Pacer::new(&config);
        assert_eq!(pacer.delay_for_origin("a.test"), Duration::ZERO);
    }

    #[test]
    fn test_max_concurrency() {
        let pacer = Pacer::new(&config(false));
        assert_eq!(pacer.max_concurrency("www.msdmanuals.com"), 3);
        assert_eq!(pacer.max_concurrency("www.msdvetmanual.com"), 1);
        assert_eq!(pacer.max_concurrency("unknown.test"), 1);
    }
}
