use std::io;
use std::thread::{self, JoinHandle};

/// Spawns a named thread, panicking if the OS refuses to create it (mirrors
/// the teacher's behavior: thread creation failure is treated as fatal, not
/// something callers are expected to recover from).
pub fn spawn_named_thread<F, T>(name: &str, f: F) -> JoinHandle<T>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    try_spawn_named_thread(name, f).unwrap_or_else(|err| {
        panic!("failed to spawn thread '{name}': {err}");
    })
}

fn try_spawn_named_thread<F, T>(name: &str, f: F) -> io::Result<JoinHandle<T>>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    thread::Builder::new().name(name.to_string()).spawn(f)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spawn_named_thread_runs_closure() {
        let handle = spawn_named_thread("test-thread", || 1 + 1);
        assert_eq!(handle.join().unwrap(), 2);
    }
}
