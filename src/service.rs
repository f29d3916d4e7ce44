use crate::config::AppConfig;
use crate::error::Result;
use crate::mailer::Notifier;
use crate::printer::{Device, DeviceStatistics};
use crate::schedule::{self, store::ScheduleStore};
use crate::template;
use chrono::{DateTime, Local, TimeZone};
use std::fmt::Display;
use std::time::Duration;
use tokio::time;
use tracing::{debug, error, info};
use url::Url;

/// What one scheduling check did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Not due; the schedule is unchanged.
    Idle { next_call: i64 },
    /// Report mailed and the advanced schedule persisted.
    Sent { next_call: i64 },
}

pub struct Reporter<N: Notifier> {
    printer_ip: String,
    fetch_timeout: Duration,
    device_url: Option<Url>,
    notifier: N,
    store: Box<dyn ScheduleStore>,
}

impl<N: Notifier> Reporter<N> {
    pub fn new(cfg: &AppConfig, notifier: N, store: Box<dyn ScheduleStore>) -> Self {
        Self {
            printer_ip: cfg.printer_ip.clone(),
            fetch_timeout: cfg.fetch_timeout,
            device_url: None,
            notifier,
            store,
        }
    }

    /// Requests the report from `url` instead of `http://<printer ip>/`.
    #[cfg(test)]
    pub fn with_device_url(mut self, url: Url) -> Self {
        self.device_url = Some(url);
        self
    }

    /// One polling cycle: check, fetch, parse, compose, send, persist.
    ///
    /// `NEXT_SEND` is written only after the mail went out. Any error before
    /// that leaves the persisted schedule as it was.
    pub async fn run_cycle<Tz>(&mut self, now: &DateTime<Tz>) -> Result<CycleOutcome>
    where
        Tz: TimeZone,
        Tz::Offset: Display,
    {
        let mut schedule = schedule::load(self.store.as_ref())?;
        let decision = schedule.should_fire_and_advance(now);
        if !decision.fire {
            debug!(
                granularity = %schedule.granularity,
                next_call = decision.next_call,
                "report not due"
            );
            return Ok(CycleOutcome::Idle {
                next_call: decision.next_call,
            });
        }

        info!(granularity = %schedule.granularity, "report due, polling printer");
        self.send_report(now).await?;

        schedule::persist(self.store.as_mut(), &schedule)?;
        info!(
            next_call = schedule.next_call,
            store = %self.store.location(),
            "schedule advanced"
        );
        Ok(CycleOutcome::Sent {
            next_call: schedule.next_call,
        })
    }

    /// Fetches, composes and mails a report without consulting the schedule.
    pub async fn send_report<Tz>(&self, now: &DateTime<Tz>) -> Result<DeviceStatistics>
    where
        Tz: TimeZone,
        Tz::Offset: Display,
    {
        let stats = self.collect().await?;
        info!(
            serial_number = %stats.serial_number,
            counter = %stats.counter,
            "statistics extracted"
        );
        let body = template::message_body(&stats, now);
        self.notifier.send(template::message_title(), &body).await?;
        Ok(stats)
    }

    async fn collect(&self) -> Result<DeviceStatistics> {
        let device = match &self.device_url {
            None => Device::connect(&self.printer_ip, self.fetch_timeout).await?,
            Some(url) => {
                let mut device =
                    Device::new(&self.printer_ip, self.fetch_timeout)?.with_base_url(url.clone());
                device.fetch().await?;
                device
            }
        };
        device.statistics()
    }

    /// Checks every `poll_interval` until Ctrl-C. A failed cycle is logged
    /// and the loop waits for the next check.
    pub async fn run(mut self, poll_interval: Duration) {
        info!(
            interval_secs = poll_interval.as_secs(),
            store = %self.store.location(),
            "printstat started"
        );
        loop {
            match self.run_cycle(&Local::now()).await {
                Ok(CycleOutcome::Sent { next_call }) => info!(next_call, "cycle complete"),
                Ok(CycleOutcome::Idle { .. }) => {}
                Err(e) => error!("cycle failed: {e}"),
            }

            tokio::select! {
                _ = time::sleep(poll_interval) => {}
                _ = tokio::signal::ctrl_c() => {
                    info!("shutting down");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::mailer::{Encryption, SmtpConfig};
    use crate::printer::report::FIXTURE;
    use crate::printer::REPORT_PATH;
    use crate::schedule::store::EnvFileStore;
    use chrono::Utc;
    use std::future::Future;
    use std::path::{Path, PathBuf};
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[derive(Clone, Default)]
    struct FakeNotifier {
        sent: Arc<Mutex<Vec<(String, String)>>>,
        fail: bool,
    }

    impl Notifier for FakeNotifier {
        fn send(&self, title: &str, body: &str) -> impl Future<Output = Result<()>> + Send {
            let result = if self.fail {
                Err(Error::MailDelivery("connection reset".into()))
            } else {
                self.sent
                    .lock()
                    .unwrap()
                    .push((title.to_string(), body.to_string()));
                Ok(())
            };
            async move { result }
        }
    }

    fn app_config() -> AppConfig {
        AppConfig {
            printer_ip: "10.0.0.1".into(),
            smtp: SmtpConfig {
                server: "smtp.example.com".into(),
                port: 25,
                login: "sender@example.com".into(),
                password: String::new(),
                receiver: "receiver@example.com".into(),
                encryption: Encryption::None,
                timeout: Duration::from_secs(5),
            },
            poll_interval: Duration::from_secs(3600),
            fetch_timeout: Duration::from_secs(5),
            schedule_file: PathBuf::from(".env"),
        }
    }

    fn schedule_file(dir: &TempDir, next_send: &str) -> PathBuf {
        let file = dir.path().join(".env");
        std::fs::write(
            &file,
            format!("PRINTER_IP=10.0.0.1\nSEND_EVERY=day\nSEND_INTERVAL=1\nNEXT_SEND={next_send}\n"),
        )
        .unwrap();
        file
    }

    fn next_send(file: &Path) -> Option<String> {
        EnvFileStore::new(file).read("NEXT_SEND").unwrap()
    }

    async fn printer(status: u16, expected_requests: u64) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(REPORT_PATH))
            .respond_with(ResponseTemplate::new(status).set_body_string(FIXTURE))
            .expect(expected_requests)
            .mount(&server)
            .await;
        server
    }

    fn reporter(server: &MockServer, file: &Path, notifier: FakeNotifier) -> Reporter<FakeNotifier> {
        Reporter::new(&app_config(), notifier, Box::new(EnvFileStore::new(file)))
            .with_device_url(Url::parse(&server.uri()).unwrap())
    }

    fn oct_22() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2022, 10, 22, 19, 46, 0).unwrap()
    }

    #[tokio::test]
    async fn due_cycle_mails_report_then_advances_schedule() {
        let dir = TempDir::new().unwrap();
        let file = schedule_file(&dir, "22");
        let server = printer(200, 1).await;
        let notifier = FakeNotifier::default();
        let mut reporter = reporter(&server, &file, notifier.clone());

        let outcome = reporter.run_cycle(&oct_22()).await.unwrap();

        assert_eq!(outcome, CycleOutcome::Sent { next_call: 23 });
        assert_eq!(next_send(&file).as_deref(), Some("23"));
        let sent = notifier.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "Counter List");
        assert!(sent[0].1.contains("Printer serial number: 701545HH0NLT2"));
        assert!(sent[0].1.contains("Printer counter: 113013 copies"));
        assert!(sent[0].1.contains("22-10-2022 19:46"));
    }

    #[tokio::test]
    async fn idle_cycle_does_not_touch_printer_or_store() {
        let dir = TempDir::new().unwrap();
        let file = schedule_file(&dir, "21");
        let server = printer(200, 0).await;
        let notifier = FakeNotifier::default();
        let mut reporter = reporter(&server, &file, notifier.clone());

        let outcome = reporter.run_cycle(&oct_22()).await.unwrap();

        assert_eq!(outcome, CycleOutcome::Idle { next_call: 21 });
        assert_eq!(next_send(&file).as_deref(), Some("21"));
        assert!(notifier.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn mail_failure_keeps_schedule() {
        let dir = TempDir::new().unwrap();
        let file = schedule_file(&dir, "22");
        let server = printer(200, 1).await;
        let notifier = FakeNotifier {
            fail: true,
            ..Default::default()
        };
        let mut reporter = reporter(&server, &file, notifier);

        let err = reporter.run_cycle(&oct_22()).await.unwrap_err();

        assert!(matches!(err, Error::MailDelivery(_)));
        assert_eq!(next_send(&file).as_deref(), Some("22"));
    }

    #[tokio::test]
    async fn fetch_failure_keeps_schedule_and_sends_nothing() {
        let dir = TempDir::new().unwrap();
        let file = schedule_file(&dir, "22");
        let server = printer(403, 1).await;
        let notifier = FakeNotifier::default();
        let mut reporter = reporter(&server, &file, notifier.clone());

        let err = reporter.run_cycle(&oct_22()).await.unwrap_err();

        assert!(matches!(err, Error::Fetch(_)));
        assert_eq!(next_send(&file).as_deref(), Some("22"));
        assert!(notifier.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn bad_schedule_fails_before_polling() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join(".env");
        std::fs::write(&file, "SEND_EVERY=monday\nSEND_INTERVAL=1\nNEXT_SEND=22\n").unwrap();
        let server = printer(200, 0).await;
        let mut reporter = reporter(&server, &file, FakeNotifier::default());

        let err = reporter.run_cycle(&oct_22()).await.unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[tokio::test]
    async fn second_cycle_same_day_is_idle() {
        let dir = TempDir::new().unwrap();
        let file = schedule_file(&dir, "22");
        let server = printer(200, 1).await;
        let notifier = FakeNotifier::default();
        let mut reporter = reporter(&server, &file, notifier.clone());

        reporter.run_cycle(&oct_22()).await.unwrap();
        let outcome = reporter.run_cycle(&oct_22()).await.unwrap();

        assert_eq!(outcome, CycleOutcome::Idle { next_call: 23 });
        assert_eq!(notifier.sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn send_report_ignores_schedule() {
        let dir = TempDir::new().unwrap();
        let file = schedule_file(&dir, "1");
        let server = printer(200, 1).await;
        let notifier = FakeNotifier::default();
        let reporter = reporter(&server, &file, notifier.clone());

        let stats = reporter.send_report(&oct_22()).await.unwrap();

        assert_eq!(stats.counter, "113013");
        assert_eq!(next_send(&file).as_deref(), Some("1"));
        assert_eq!(notifier.sent.lock().unwrap().len(), 1);
    }
}
