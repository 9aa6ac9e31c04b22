    use super::*;
    use crate::schema::ScheduledJob;

    fn cron_job(name: &str, expression: &str) -> ScheduledJob {
        ScheduledJob {
            name: name.to_string(),
            group: "DEFAULT".to_string(),
            executable: "log".to_string(),
            cron: Some(expression.to_string()),
            misfire: None,
            interval_secs: None,
            repeat: None,
            allow_concurrent: true,
            persist_data: false,
            description: None,
            data: Default::default(),
        }
    }

    fn interval_job(name: &str, secs: u64) -> ScheduledJob {
        ScheduledJob {
            cron: None,
            interval_secs: Some(secs),
            ..cron_job(name, "")
        }
    }

    #[test]
    fn test_validate_default_config() {
        let config = Config::default();
        let result = ConfigValidator::validate(&config).unwrap();
        assert!(result.is_valid());
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn test_validate_zero_poll_interval() {
        let mut config = Config::default();
        config.scheduler.poll_interval_ms = 0;

        let result = ConfigValidator::validate(&config).unwrap();
        assert!(!result.is_valid());
        assert!(result.errors.iter().any(|e| e.path == "scheduler.poll_interval_ms"));
    }

    #[test]
    fn test_validate_slow_poll_interval_warning() {
        let mut config = Config::default();
        config.scheduler.poll_interval_ms = 5000;

        let result = ConfigValidator::validate(&config).unwrap();
        assert!(result.is_valid());
        assert!(result.warnings.iter().any(|w| w.path == "scheduler.poll_interval_ms"));
    }

    #[test]
    fn test_validate_zero_workers() {
        let mut config = Config::default();
        config.scheduler.max_workers = 0;

        let result = ConfigValidator::validate(&config).unwrap();
        assert!(result.errors.iter().any(|e| e.path == "scheduler.max_workers"));
    }

    #[test]
    fn test_validate_job_needs_exactly_one_schedule() {
        let mut both = cron_job("both", "0 * * * * ?");
        both.interval_secs = Some(10);
        let mut neither = cron_job("neither", "");
        neither.cron = None;

        let mut config = Config::default();
        config.scheduler.jobs = vec![both, neither];

        let result = ConfigValidator::validate(&config).unwrap();
        assert_eq!(result.errors.len(), 2);
        assert!(result.errors.iter().any(|e| e.path == "scheduler.jobs[0]"));
        assert!(result.errors.iter().any(|e| e.path == "scheduler.jobs[1]"));
    }

    #[test]
    fn test_validate_zero_interval() {
        let mut config = Config::default();
        config.scheduler.jobs = vec![interval_job("tick", 0)];

        let result = ConfigValidator::validate(&config).unwrap();
        assert!(result.errors.iter().any(|e| e.path == "scheduler.jobs[0].interval_secs"));
    }

    #[test]
    fn test_validate_unknown_misfire_code() {
        let mut job = cron_job("report", "0/10 * * * * ?");
        job.misfire = Some(7);
        let mut config = Config::default();
        config.scheduler.jobs = vec![job];

        let result = ConfigValidator::validate(&config).unwrap();
        assert!(result.errors.iter().any(|e| e.path == "scheduler.jobs[0].misfire"));
    }

    #[test]
    fn test_validate_misfire_on_interval_warns() {
        let mut job = interval_job("tick", 5);
        job.misfire = Some(1);
        let mut config = Config::default();
        config.scheduler.jobs = vec![job];

        let result = ConfigValidator::validate(&config).unwrap();
        assert!(result.is_valid());
        assert!(result.warnings.iter().any(|w| w.path == "scheduler.jobs[0].misfire"));
    }

    #[test]
    fn test_validate_duplicate_job_warns() {
        let mut config = Config::default();
        config.scheduler.jobs = vec![
            cron_job("report", "0 * * * * ?"),
            cron_job("report", "0/5 * * * * ?"),
        ];

        let result = ConfigValidator::validate(&config).unwrap();
        assert!(result.is_valid());
        assert_eq!(result.warnings.len(), 1);
    }

    #[test]
    fn test_validate_empty_names() {
        let mut job = cron_job("", "0 * * * * ?");
        job.group = String::new();
        let mut config = Config::default();
        config.scheduler.jobs = vec![job];

        let result = ConfigValidator::validate(&config).unwrap();
        assert!(result.errors.iter().any(|e| e.path == "scheduler.jobs[0].name"));
        assert!(result.errors.iter().any(|e| e.path == "scheduler.jobs[0].group"));
    }

    #[test]
    fn test_validate_empty_dead_letter_topic() {
        let mut config = Config::default();
        config.dead_letter.topic = String::new();

        let result = ConfigValidator::validate(&config).unwrap();
        assert!(result.errors.iter().any(|e| e.path == "dead_letter.topic"));
    }

    #[test]
    fn test_validate_log_level() {
        let mut config = Config::default();
        config.logging.level = "verbose".to_string();
        let result = ConfigValidator::validate(&config).unwrap();
        assert!(result.warnings.iter().any(|w| w.path == "logging.level"));

        config.logging.level = "cadence_scheduler=debug".to_string();
        let result = ConfigValidator::validate(&config).unwrap();
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn test_into_result_reports_first_error() {
        let mut config = Config::default();
        config.scheduler.max_workers = 0;

        let result = ConfigValidator::validate(&config).unwrap();
        let err = result.into_result().unwrap_err();
        assert!(err.to_string().contains("scheduler.max_workers"));
    }
