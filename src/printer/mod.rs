pub mod report;

use crate::error::{Error, Result};
use report::{ReportDocument, ReportLayout};
use std::net::IpAddr;
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

pub const REPORT_PATH: &str = "/cgi-bin/dynamic/printer/config/reports/devicestatistics.html";

/// Checks that `address` is an IPv4 or IPv6 literal. Surrounding
/// whitespace is rejected.
pub fn parse_address(address: &str) -> Result<IpAddr> {
    address
        .parse::<IpAddr>()
        .map_err(|_| Error::InvalidAddress(address.to_string()))
}

/// The raw statistics page, if one has been fetched.
#[derive(Debug, Default, Clone)]
pub struct DeviceReport {
    raw_text: Option<String>,
}

impl DeviceReport {
    pub fn from_text(raw_text: String) -> Self {
        Self {
            raw_text: Some(raw_text),
        }
    }

    fn document(&self) -> Result<ReportDocument> {
        self.raw_text
            .as_deref()
            .map(ReportDocument::parse)
            .ok_or(Error::ReportUnavailable)
    }
}

/// Values pulled from one report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceStatistics {
    pub counter: String,
    pub serial_number: String,
}

/// HTTP client for one printer's embedded web server.
pub struct Device {
    address: IpAddr,
    base_url: Url,
    http: reqwest::Client,
    layout: ReportLayout,
    report: DeviceReport,
}

impl Device {
    /// Validates the address. No request is made until [`fetch`](Self::fetch).
    pub fn new(address: &str, timeout: Duration) -> Result<Self> {
        let address = parse_address(address)?;
        let host = match address {
            IpAddr::V4(v4) => v4.to_string(),
            IpAddr::V6(v6) => format!("[{v6}]"),
        };
        let base_url = Url::parse(&format!("http://{host}/"))
            .map_err(|e| Error::InvalidAddress(format!("{address}: {e}")))?;
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Fetch(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            address,
            base_url,
            http,
            layout: ReportLayout::default(),
            report: DeviceReport::default(),
        })
    }

    /// Validates the address and fetches the report in one step.
    pub async fn connect(address: &str, timeout: Duration) -> Result<Self> {
        let mut device = Self::new(address, timeout)?;
        device.fetch().await?;
        Ok(device)
    }

    /// Overrides the scheme/host/port the report is requested from.
    pub fn with_base_url(mut self, base_url: Url) -> Self {
        self.base_url = base_url;
        self
    }

    pub fn report_url(&self) -> Result<Url> {
        self.base_url
            .join(REPORT_PATH)
            .map_err(|e| Error::Fetch(format!("invalid report URL: {e}")))
    }

    /// Downloads the statistics page. Any previously fetched report is
    /// dropped first, so a failed fetch leaves nothing to extract from.
    pub async fn fetch(&mut self) -> Result<()> {
        self.report = DeviceReport::default();
        let url = self.report_url()?;
        debug!(%url, "requesting device report");

        let response = self
            .http
            .get(url.clone())
            .send()
            .await
            .map_err(|e| Error::Fetch(format!("{url}: {e}")))?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(Error::Fetch(format!("{url} returned {status}")));
        }

        let text = response
            .text()
            .await
            .map_err(|e| Error::Fetch(format!("{url}: failed to read body: {e}")))?;
        info!(device = %self.address, bytes = text.len(), "device report fetched");
        self.report = DeviceReport::from_text(text);
        Ok(())
    }

    pub fn counter(&self) -> Result<String> {
        report::extract_counter(&self.report.document()?, &self.layout)
    }

    pub fn serial_number(&self) -> Result<String> {
        report::extract_serial_number(&self.report.document()?, &self.layout)
    }

    pub fn statistics(&self) -> Result<DeviceStatistics> {
        Ok(DeviceStatistics {
            counter: self.counter()?,
            serial_number: self.serial_number()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use report::FIXTURE;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const TIMEOUT: Duration = Duration::from_secs(5);

    async fn serve(status: u16, body: &str) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(REPORT_PATH))
            .respond_with(ResponseTemplate::new(status).set_body_string(body))
            .mount(&server)
            .await;
        server
    }

    fn device_for(server: &MockServer) -> Device {
        Device::new("10.0.0.1", TIMEOUT)
            .unwrap()
            .with_base_url(Url::parse(&server.uri()).unwrap())
    }

    #[test]
    fn validates_ip_addresses() {
        for (ip, expected) in [
            ("192.168.0.1", true),
            ("1.1.1.1", true),
            ("::1", true),
            ("fe80::1", true),
            ("192.168.0.1a", false),
            ("invalid", false),
            ("256.1.1.1", false),
            ("", false),
            (" 1.1.1.1 ", false),
            ("1.1.1.1\n", false),
        ] {
            assert_eq!(parse_address(ip).is_ok(), expected, "{ip}");
        }
    }

    #[test]
    fn new_rejects_invalid_address() {
        let err = Device::new("invalid_ip_address", TIMEOUT).err().unwrap();
        assert!(matches!(err, Error::InvalidAddress(ref a) if a == "invalid_ip_address"));
    }

    #[test]
    fn report_url_uses_fixed_path() {
        let device = Device::new("192.168.0.1", TIMEOUT).unwrap();
        assert_eq!(
            device.report_url().unwrap().as_str(),
            "http://192.168.0.1/cgi-bin/dynamic/printer/config/reports/devicestatistics.html"
        );
    }

    #[test]
    fn report_url_brackets_ipv6() {
        let device = Device::new("fe80::1", TIMEOUT).unwrap();
        assert!(device
            .report_url()
            .unwrap()
            .as_str()
            .starts_with("http://[fe80::1]/cgi-bin/"));
    }

    #[test]
    fn extraction_before_fetch_is_unavailable() {
        let device = Device::new("127.2.2.2", TIMEOUT).unwrap();
        assert!(matches!(device.counter(), Err(Error::ReportUnavailable)));
        assert!(matches!(device.serial_number(), Err(Error::ReportUnavailable)));
        assert!(matches!(device.statistics(), Err(Error::ReportUnavailable)));
    }

    #[tokio::test]
    async fn fetch_and_extract_fixture() {
        let server = serve(200, FIXTURE).await;
        let mut device = device_for(&server);
        device.fetch().await.unwrap();

        assert_eq!(device.counter().unwrap(), "113013");
        assert_eq!(device.serial_number().unwrap(), "701545HH0NLT2");
        assert_eq!(
            device.statistics().unwrap(),
            DeviceStatistics {
                counter: "113013".into(),
                serial_number: "701545HH0NLT2".into(),
            }
        );
    }

    #[tokio::test]
    async fn forbidden_is_a_fetch_error_and_leaves_no_report() {
        let server = serve(403, "forbidden").await;
        let mut device = device_for(&server);

        let err = device.fetch().await.unwrap_err();
        assert!(matches!(&err, Error::Fetch(msg) if msg.contains("403")), "{err}");
        assert!(matches!(device.counter(), Err(Error::ReportUnavailable)));
        assert!(matches!(device.serial_number(), Err(Error::ReportUnavailable)));
    }

    #[tokio::test]
    async fn failed_refetch_discards_previous_report() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(REPORT_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_string(FIXTURE))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(REPORT_PATH))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let mut device = device_for(&server);
        device.fetch().await.unwrap();
        assert!(device.counter().is_ok());

        assert!(device.fetch().await.is_err());
        assert!(matches!(device.counter(), Err(Error::ReportUnavailable)));
    }

    #[tokio::test]
    async fn non_ok_success_status_is_rejected() {
        let server = serve(204, "").await;
        let mut device = device_for(&server);
        assert!(matches!(device.fetch().await, Err(Error::Fetch(_))));
    }

    #[tokio::test]
    async fn unexpected_layout_is_a_format_error() {
        let server = serve(200, "<html><body><p>maintenance</p></body></html>").await;
        let mut device = device_for(&server);
        device.fetch().await.unwrap();
        assert!(matches!(device.counter(), Err(Error::ReportFormat(_))));
    }

    #[tokio::test]
    async fn slow_device_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(FIXTURE)
                    .set_delay(Duration::from_secs(2)),
            )
            .mount(&server)
            .await;

        let mut device = Device::new("10.0.0.1", Duration::from_millis(200))
            .unwrap()
            .with_base_url(Url::parse(&server.uri()).unwrap());
        assert!(matches!(device.fetch().await, Err(Error::Fetch(_))));
        assert!(matches!(device.counter(), Err(Error::ReportUnavailable)));
    }

    #[tokio::test]
    async fn connect_rejects_bad_address_without_request() {
        let err = Device::connect("192.168.0.1a", TIMEOUT).await.err().unwrap();
        assert!(matches!(err, Error::InvalidAddress(_)));
    }
}
