// Copyright 2023 Comcast Cable Communications Management, LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0
//

use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};

/*
ISO8601 with millisecond precision, e.g: 2022-06-23T16:16:10.123Z
*/
pub fn to_iso8601(time: DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/*
Human readable age for operators: 850ms, 12.3s, 5m 02s, 1h 03m
*/
pub fn format_age(age: Duration) -> String {
    let millis = age.as_millis();
    if millis < 1000 {
        return format!("{}ms", millis);
    }
    let secs = age.as_secs();
    if secs < 60 {
        return format!("{:.1}s", age.as_secs_f64());
    }
    if secs < 3600 {
        return format!("{}m {:02}s", secs / 60, secs % 60);
    }
    format!("{}h {:02}m", secs / 3600, (secs % 3600) / 60)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rstest::rstest;

    #[rstest(
        age,
        expected,
        case(Duration::from_millis(850), "850ms"),
        case(Duration::from_millis(12_340), "12.3s"),
        case(Duration::from_secs(302), "5m 02s"),
        case(Duration::from_secs(3780), "1h 03m")
    )]
    fn test_format_age(age: Duration, expected: &str) {
        assert_eq!(format_age(age), expected);
    }

    #[test]
    fn test_to_iso8601() {
        let t = Utc.with_ymd_and_hms(2022, 6, 23, 16, 16, 10).unwrap();
        assert_eq!(to_iso8601(t), "2022-06-23T16:16:10.000Z");
    }
}
