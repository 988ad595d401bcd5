use gleaner_common::FetchParams;
use rand::seq::SliceRandom;
use rand::Rng;
use std::time::Duration;

/// Read-only pool of backend parameters.
///
/// Shared behind an `Arc` by every controller run; choice is random and
/// needs no lock.
#[derive(Debug, Clone)]
pub struct ParamPool {
    user_agents: Vec<String>,
    proxies: Vec<String>,
    locales: Vec<String>,
    settle_timeout: Duration,
}

impl Default for ParamPool {
    fn default() -> Self {
        Self::new(Vec::new(), Vec::new(), Vec::new())
    }
}

impl ParamPool {
    pub fn new(user_agents: Vec<String>, proxies: Vec<String>, locales: Vec<String>) -> Self {
        Self {
            user_agents: non_empty(user_agents),
            proxies: non_empty(proxies),
            locales: non_empty(locales),
            settle_timeout: FetchParams::default().settle_timeout,
        }
    }

    pub fn with_settle_timeout(mut self, timeout: Duration) -> Self {
        self.settle_timeout = timeout;
        self
    }

    /// Random initial parameters.
    pub fn draw(&self) -> FetchParams {
        self.draw_with(&mut rand::thread_rng())
    }

    pub fn draw_with<R: Rng + ?Sized>(&self, rng: &mut R) -> FetchParams {
        FetchParams {
            user_agent: self.user_agents.choose(rng).cloned(),
            proxy: self.proxies.choose(rng).cloned(),
            locale: self.locales.choose(rng).cloned(),
            settle_timeout: self.settle_timeout,
        }
    }

    /// New parameters after a transient failure.
    ///
    /// Each dimension prefers a value different from the current one and
    /// keeps the current value only when the pool has nothing else.
    pub fn rotate(&self, current: &FetchParams) -> FetchParams {
        self.rotate_with(current, &mut rand::thread_rng())
    }

    pub fn rotate_with<R: Rng + ?Sized>(&self, current: &FetchParams, rng: &mut R) -> FetchParams {
        FetchParams {
            user_agent: pick_other(&self.user_agents, current.user_agent.as_deref(), rng),
            proxy: pick_other(&self.proxies, current.proxy.as_deref(), rng),
            locale: pick_other(&self.locales, current.locale.as_deref(), rng),
            settle_timeout: current.settle_timeout,
        }
    }
}

fn non_empty(values: Vec<String>) -> Vec<String> {
    values
        .into_iter()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .collect()
}

fn pick_other<R: Rng + ?Sized>(values: &[String], current: Option<&str>, rng: &mut R) -> Option<String> {
    let others: Vec<&String> = values
        .iter()
        .filter(|v| Some(v.as_str()) != current)
        .collect();
    match others.choose(rng) {
        Some(v) => Some((*v).clone()),
        None => values.choose(rng).cloned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn pool() -> ParamPool {
        ParamPool::new(
            vec!["ua-1".into(), "ua-2".into()],
            vec!["http://p1:8080".into(), "http://p2:8080".into(), "http://p3:8080".into()],
            vec!["en-US".into()],
        )
    }

    #[test]
    fn rotation_prefers_a_different_value() {
        let pool = pool();
        let mut rng = StdRng::seed_from_u64(7);
        let mut params = pool.draw_with(&mut rng);
        for _ in 0..50 {
            let next = pool.rotate_with(&params, &mut rng);
            assert_ne!(next.user_agent, params.user_agent);
            assert_ne!(next.proxy, params.proxy);
            // only one locale: kept
            assert_eq!(next.locale.as_deref(), Some("en-US"));
            params = next;
        }
    }

    #[test]
    fn empty_pool_yields_empty_params() {
        let pool = ParamPool::new(vec![" ".into()], vec![], vec![]);
        let params = pool.draw();
        assert_eq!(params.user_agent, None);
        assert_eq!(params.proxy, None);
        assert_eq!(pool.rotate(&params), params);
    }

    #[test]
    fn settle_timeout_is_carried() {
        let pool = ParamPool::default().with_settle_timeout(Duration::from_secs(3));
        assert_eq!(pool.draw().settle_timeout, Duration::from_secs(3));
    }
}
