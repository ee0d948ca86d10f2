//! Sequential sessions must not leak PTY descriptors.
//!
//! Kept in its own test binary so no other test opens descriptors while the
//! counts are taken.

#[cfg(target_os = "linux")]
mod descriptor_lifecycle {
    use imagedesc_adapters::Session;
    use imagedesc_core::SessionConfig;
    use std::time::Duration;

    const REPL: &str = r#"
stty -echo 2>/dev/null
printf '>>> '
while IFS= read -r line; do printf 'answer\n>>> '; done
"#;

    fn open_descriptors() -> usize {
        std::fs::read_dir("/proc/self/fd")
            .expect("read /proc/self/fd")
            .count()
    }

    fn config() -> SessionConfig {
        SessionConfig::default()
            .with_program("sh", ["-c", REPL])
            .with_working_dir(std::env::temp_dir())
            .with_poll_interval(Duration::from_millis(10))
            .with_banner_timeout(Duration::from_secs(10))
            .with_read_timeout(Duration::from_secs(10))
            .with_terminate_grace(Duration::from_millis(500))
    }

    #[tokio::test(flavor = "current_thread")]
    async fn back_to_back_sessions_release_their_descriptors() {
        let before = open_descriptors();

        let first = Session::new(config(), "/tmp/a.jpg").run().await.expect("first");
        assert!(first.is_complete());
        let after_first = open_descriptors();

        let second = Session::new(config(), "/tmp/b.jpg").run().await.expect("second");
        assert!(second.is_complete());
        let after_second = open_descriptors();

        assert_eq!(after_first, before, "first session leaked descriptors");
        assert_eq!(after_second, before, "second session leaked descriptors");
    }
}
