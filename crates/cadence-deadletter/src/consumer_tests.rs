    use super::*;
    use crate::error::ErrorClass;
    use crate::memory::{MemoryRecordSink, MemoryRecordSource};
    use crate::record::{ORIGIN_ERROR_MSG, ORIGIN_OFFSET};
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Fails the first `failures` calls with `class`, then succeeds.
    struct ScriptedHandler {
        failures: u32,
        class: ErrorClass,
        calls: AtomicU32,
    }

    impl ScriptedHandler {
        fn new(failures: u32, class: ErrorClass) -> Arc<Self> {
            Arc::new(Self {
                failures,
                class,
                calls: AtomicU32::new(0),
            })
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl RecordHandler for ScriptedHandler {
        async fn handle(&self, _record: &ConsumerRecord) -> std::result::Result<(), HandlerError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call <= self.failures {
                return Err(HandlerError::new(self.class, format!("failure #{}", call)));
            }
            Ok(())
        }
    }

    struct Fixture {
        source: Arc<MemoryRecordSource>,
        sink: Arc<MemoryRecordSink>,
        consumer: RetryingConsumer,
    }

    fn fixture(handler: Arc<dyn RecordHandler>, policy: RetryPolicy) -> Fixture {
        let source = Arc::new(MemoryRecordSource::new("orders"));
        let sink = Arc::new(MemoryRecordSink::new());
        let recoverer = DeadLetterRecoverer::new(sink.clone(), "dead-letter-queue");
        let consumer = RetryingConsumer::new(source.clone(), handler, recoverer, policy)
            .with_poll_timeout(Duration::from_millis(10));
        Fixture {
            source,
            sink,
            consumer,
        }
    }

    fn quick_policy() -> RetryPolicy {
        RetryPolicy::new(2, Duration::ZERO)
    }

    #[tokio::test]
    async fn test_success_on_first_attempt() {
        let handler = ScriptedHandler::new(0, ErrorClass::Transient);
        let f = fixture(handler.clone(), quick_policy());
        f.source.push(None, b"{}".to_vec());

        let outcome = f.consumer.poll_once().await.unwrap().unwrap();
        assert_eq!(outcome, RecordOutcome::Processed { attempts: 1 });
        assert_eq!(f.source.committed_offset(), Some(0));
        assert!(f.sink.sent().is_empty());
    }

    #[tokio::test]
    async fn test_transient_failure_recovers_within_budget() {
        let handler = ScriptedHandler::new(2, ErrorClass::Transient);
        let f = fixture(handler.clone(), quick_policy());
        f.source.push(None, b"{}".to_vec());

        let outcome = f.consumer.poll_once().await.unwrap().unwrap();
        assert_eq!(outcome, RecordOutcome::Processed { attempts: 3 });
        assert_eq!(handler.calls(), 3);
        assert!(f.sink.sent().is_empty());
    }

    #[tokio::test]
    async fn test_exhausted_retries_go_to_dead_letter() {
        let handler = ScriptedHandler::new(u32::MAX, ErrorClass::Transient);
        let f = fixture(handler.clone(), quick_policy());
        f.source.push(Some(b"k1".to_vec()), b"payload".to_vec());

        let outcome = f.consumer.poll_once().await.unwrap().unwrap();
        assert_eq!(
            outcome,
            RecordOutcome::DeadLettered {
                attempts: 3,
                reason: "failure #3".to_string()
            }
        );
        assert_eq!(handler.calls(), 3);

        let sent = f.sink.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].topic, "dead-letter-queue");
        assert_eq!(sent[0].key.as_deref(), Some(b"k1".as_slice()));
        assert_eq!(sent[0].value, b"payload".to_vec());
        assert_eq!(sent[0].header(ORIGIN_ERROR_MSG), Some("failure #3"));
        assert_eq!(sent[0].header(ORIGIN_OFFSET), Some("0"));

        // Recovered records are committed.
        assert_eq!(f.source.committed_offset(), Some(0));
        assert_eq!(f.source.pending(), 0);
    }

    #[tokio::test]
    async fn test_non_retryable_skips_retries() {
        let handler = ScriptedHandler::new(u32::MAX, ErrorClass::Serialization);
        let f = fixture(handler.clone(), quick_policy());
        f.source.push(None, b"not json".to_vec());

        let outcome = f.consumer.poll_once().await.unwrap().unwrap();
        assert_eq!(outcome.attempts(), 1);
        assert!(matches!(outcome, RecordOutcome::DeadLettered { .. }));
        assert_eq!(handler.calls(), 1);
        assert_eq!(f.sink.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_dead_letter_failure_leaves_record_uncommitted() {
        let handler = ScriptedHandler::new(u32::MAX, ErrorClass::Validation);
        let f = fixture(handler.clone(), quick_policy());
        f.sink.set_failing(true);
        f.source.push(None, b"bad".to_vec());

        let outcome = f.consumer.poll_once().await.unwrap().unwrap();
        assert!(matches!(outcome, RecordOutcome::DeadLetterFailed { attempts: 3, .. }));
        assert!(!outcome.should_commit());
        assert_eq!(f.source.committed_offset(), None);
        assert_eq!(f.source.pending(), 1);

        // The record is redelivered and recovered once the sink is back.
        f.sink.set_failing(false);
        let outcome = f.consumer.poll_once().await.unwrap().unwrap();
        assert!(matches!(outcome, RecordOutcome::DeadLettered { .. }));
        assert_eq!(f.source.committed_offset(), Some(0));
    }

    #[tokio::test]
    async fn test_poll_once_idle() {
        let handler = ScriptedHandler::new(0, ErrorClass::Transient);
        let f = fixture(handler, quick_policy());
        assert!(f.consumer.poll_once().await.unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_default_policy_waits_between_attempts() {
        let handler = ScriptedHandler::new(u32::MAX, ErrorClass::Transient);
        let f = fixture(handler.clone(), RetryPolicy::default());
        f.source.push(None, b"x".to_vec());

        let started = tokio::time::Instant::now();
        let outcome = f.consumer.poll_once().await.unwrap().unwrap();
        assert_eq!(outcome.attempts(), 3);
        assert!(started.elapsed() >= Duration::from_secs(2));
    }

    /// Records the values it saw.
    struct Recorder {
        seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl RecordHandler for Recorder {
        async fn handle(&self, record: &ConsumerRecord) -> std::result::Result<(), HandlerError> {
            self.seen.lock().push(record.value_lossy());
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_run_consumes_until_shutdown() {
        let recorder = Arc::new(Recorder {
            seen: Mutex::new(Vec::new()),
        });
        let f = fixture(recorder.clone(), quick_policy());
        let source = f.source.clone();
        let consumer = Arc::new(f.consumer);

        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(consumer.run(rx));

        source.push(None, b"one".to_vec());
        source.push(None, b"two".to_vec());
        for _ in 0..100 {
            if source.pending() == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(*recorder.seen.lock(), vec!["one", "two"]);
        assert_eq!(source.committed_offset(), Some(1));
    }
