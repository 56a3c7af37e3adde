use std::sync::Mutex;

/// Opaque handle returned by `Transport::add_disconnect`. Consumed by
/// `remove_disconnect`; holding one past removal or past the hooks firing is
/// harmless (remove/run just won't find it again).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HookHandle(u64);

type Hook = Box<dyn FnOnce() + Send>;

#[derive(Default)]
pub struct DisconnectHooks {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    next_id: u64,
    // None marks a removed slot; kept so existing handles stay valid indices.
    hooks: Vec<(u64, Option<Hook>)>,
}

impl DisconnectHooks {
    pub fn add(&self, hook: Hook) -> HookHandle {
        let mut inner = self.inner.lock().unwrap();
        let id = inner.next_id;
        inner.next_id += 1;
        inner.hooks.push((id, Some(hook)));
        HookHandle(id)
    }

    pub fn remove(&self, handle: HookHandle) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(slot) = inner.hooks.iter_mut().find(|(id, _)| *id == handle.0) {
            slot.1 = None;
        }
    }

    /// Invokes and clears every still-registered hook, in registration
    /// order. Calling this twice in a row fires each hook at most once
    /// across both calls: the second call sees an empty list.
    ///
    /// Hooks run without the internal lock held, so a hook that tries to
    /// add or remove another hook doesn't deadlock.
    pub fn run(&self) {
        let drained: Vec<Hook> = {
            let mut inner = self.inner.lock().unwrap();
            inner.hooks.drain(..).filter_map(|(_, hook)| hook).collect()
        };
        for hook in drained {
            hook();
        }
    }
}
