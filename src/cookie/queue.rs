use std::sync::Arc;

use parking_lot::Mutex;

use super::Cookie;

/// Lifetime used for deletion markers: one day in the past.
const DELETE_LIFETIME: i64 = -86_400;

/// Outbound cookies scheduled during one request.
///
/// `CookiesMiddleware` creates exactly one queue per request and exposes it
/// both as a request attribute and as a scoped binding. Clones share the same
/// underlying list, so cookies scheduled by the handler are visible to the
/// middleware when the response travels back out.
#[derive(Clone, Debug)]
pub struct CookieQueue {
    inner: Arc<Mutex<QueueState>>,
}

#[derive(Debug)]
struct QueueState {
    domain: Option<String>,
    secure: bool,
    scheduled: Vec<Cookie>,
}

impl CookieQueue {
    pub fn new(domain: Option<String>, secure: bool) -> Self {
        Self {
            inner: Arc::new(Mutex::new(QueueState {
                domain,
                secure,
                scheduled: Vec::new(),
            })),
        }
    }

    /// Default domain for cookies scheduled through [`set`](Self::set).
    pub fn domain(&self) -> Option<String> {
        self.inner.lock().domain.clone()
    }

    pub fn is_secure(&self) -> bool {
        self.inner.lock().secure
    }

    /// Schedules a session cookie using the queue's domain and secure flag.
    pub fn set(&self, name: impl Into<String>, value: impl Into<String>) {
        self.set_for(name, value, None);
    }

    /// Like [`set`](Self::set) with an explicit lifetime in seconds.
    pub fn set_for(&self, name: impl Into<String>, value: impl Into<String>, lifetime: Option<i64>) {
        let cookie = {
            let state = self.inner.lock();
            Cookie::new(name, value)
                .with_lifetime(lifetime)
                .with_domain(state.domain.clone())
                .with_secure(state.secure)
        };
        self.schedule(cookie);
    }

    /// Schedules a fully specified cookie, replacing any cookie with the same name.
    pub fn schedule(&self, cookie: Cookie) {
        let mut state = self.inner.lock();
        state.scheduled.retain(|c| c.name() != cookie.name());
        state.scheduled.push(cookie);
    }

    /// Replaces any scheduled cookie named `name` with an expired, empty one.
    pub fn delete(&self, name: impl Into<String>) {
        let cookie = {
            let state = self.inner.lock();
            Cookie::new(name, "")
                .with_lifetime(Some(DELETE_LIFETIME))
                .with_domain(state.domain.clone())
                .with_secure(state.secure)
        };
        self.schedule(cookie);
    }

    pub fn has_scheduled(&self, name: &str) -> bool {
        self.inner.lock().scheduled.iter().any(|c| c.name() == name)
    }

    /// Snapshot of the scheduled cookies, in scheduling order.
    pub fn scheduled(&self) -> Vec<Cookie> {
        self.inner.lock().scheduled.clone()
    }

    /// Whether `other` is a handle to this very queue.
    pub fn is_same(&self, other: &CookieQueue) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}
