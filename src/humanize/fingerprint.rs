use rand::seq::SliceRandom;
use rand::Rng;
use tracing::warn;

use crate::config::{BrowserConfig, FingerprintConfig};
use crate::driver::LaunchOptions;

/// What one session presents to the site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fingerprint {
    /// `None` keeps the browser's own user agent.
    pub user_agent: Option<String>,
    pub viewport: (u32, u32),
    pub proxy: Option<String>,
}

impl Fingerprint {
    /// Browser launch options for this fingerprint.
    pub fn launch_options(&self, browser: &BrowserConfig) -> LaunchOptions {
        LaunchOptions {
            headless: browser.headless,
            no_sandbox: browser.no_sandbox,
            user_agent: self.user_agent.clone(),
            proxy: self.proxy.clone(),
        }
    }
}

/// Chooses a fingerprint for each new browser context.
pub trait FingerprintSource: Send + Sync {
    fn pick(&self) -> Fingerprint;
}

/// Random user agent and viewport from the configured pools.
#[derive(Debug, Clone)]
pub struct RandomFingerprint {
    config: FingerprintConfig,
    proxy: Option<String>,
}

impl RandomFingerprint {
    pub fn new(config: &FingerprintConfig) -> Self {
        let address = config.proxy_address.trim();
        let proxy = match (config.use_proxy, address.is_empty()) {
            (true, false) => Some(address.to_string()),
            (true, true) => {
                warn!("use_proxy is set but proxy_address is empty, connecting directly");
                None
            }
            (false, _) => None,
        };
        Self {
            config: config.clone(),
            proxy,
        }
    }
}

impl FingerprintSource for RandomFingerprint {
    fn pick(&self) -> Fingerprint {
        let mut rng = rand::thread_rng();
        let user_agent = if self.config.rotate_user_agent {
            self.config.user_agents.choose(&mut rng).cloned()
        } else {
            None
        };
        let [w_lo, w_hi] = self.config.viewport_width;
        let [h_lo, h_hi] = self.config.viewport_height;
        let width = if w_lo < w_hi { rng.gen_range(w_lo..=w_hi) } else { w_lo };
        let height = if h_lo < h_hi { rng.gen_range(h_lo..=h_hi) } else { h_lo };

        Fingerprint {
            user_agent,
            viewport: (width, height),
            proxy: self.proxy.clone(),
        }
    }
}

/// Always the same fingerprint.
#[derive(Debug, Clone)]
pub struct FixedFingerprint(pub Fingerprint);

impl FingerprintSource for FixedFingerprint {
    fn pick(&self) -> Fingerprint {
        self.0.clone()
    }
}
