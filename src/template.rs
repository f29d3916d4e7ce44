use crate::printer::DeviceStatistics;
use chrono::{DateTime, TimeZone};
use std::fmt::Display;

pub fn message_title() -> &'static str {
    "Counter List"
}

pub fn message_body<Tz>(stats: &DeviceStatistics, at: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    format!(
        "Time: {}\nPrinter serial number: {}\nPrinter counter: {} copies\n",
        at.format("%d-%m-%Y %H:%M"),
        stats.serial_number,
        stats.counter
    )
}
