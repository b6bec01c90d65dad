use bonsai_core::communication::{CoreObjects, Hub, HubActuator, HubSubscriber};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

const POLL: Duration = Duration::from_millis(200);

/// Logs everything behaviors say through the `SpeechActuator`.
pub struct SpeechLog {
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<usize>>,
}

impl SpeechLog {
    pub fn spawn(said: HubSubscriber<String>) -> std::io::Result<Self> {
        let running = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&running);
        let handle = std::thread::Builder::new()
            .name("speech-log".to_string())
            .spawn(move || {
                let mut count = 0;
                while flag.load(Ordering::SeqCst) {
                    if let Some(text) = said.recv_timeout(POLL) {
                        tracing::info!("SpeechActuator: {}", text);
                        count += 1;
                    }
                }
                count
            })?;
        Ok(Self {
            running,
            handle: Some(handle),
        })
    }

    /// Stop the thread; returns how many utterances were logged.
    pub fn shutdown(&mut self) -> usize {
        self.running.store(false, Ordering::SeqCst);
        self.handle
            .take()
            .and_then(|h| h.join().ok())
            .unwrap_or(0)
    }
}

impl Drop for SpeechLog {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Actuators available to behaviors loaded into the daemon.
pub fn core_objects() -> std::io::Result<(CoreObjects, SpeechLog)> {
    let speech: Hub<String> = Hub::new("speech");
    let log = SpeechLog::spawn(speech.subscribe())?;

    let objects = CoreObjects::new();
    objects.add_actuator("SpeechActuator", Arc::new(HubActuator::new("speech", speech)));
    Ok((objects, log))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_thread_stops_on_shutdown() {
        let (objects, mut log) = core_objects().unwrap();
        let speech = objects
            .actuator::<HubActuator<String>>("SpeechActuator")
            .unwrap();
        speech.command("hello".to_string());
        std::thread::sleep(Duration::from_millis(50));

        assert_eq!(log.shutdown(), 1);
        assert_eq!(log.shutdown(), 0);
    }
}
