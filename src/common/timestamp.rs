/*
 * Copyright (c) 2022 Yunshan Networks
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 *     http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 */

// Packet time in nanoseconds, half the size of a Duration. Flows keep
// several of these.

use std::cmp::Ordering;
use std::fmt;
use std::ops::{Add, Sub};
use std::time::Duration;

#[derive(Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(u64);

impl From<Duration> for Timestamp {
    fn from(d: Duration) -> Self {
        Self(d.as_nanos() as u64)
    }
}

impl From<Timestamp> for Duration {
    fn from(t: Timestamp) -> Self {
        Self::from_nanos(t.as_nanos())
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Duration::from(*self).fmt(f)
    }
}

// seconds.microseconds, as printed in flow records
impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.as_secs(), self.subsec_micros())
    }
}

impl Timestamp {
    const NANOS_IN_SECOND: u64 = Duration::from_secs(1).as_nanos() as u64;
    const NANOS_IN_MILLIS: u64 = Duration::from_millis(1).as_nanos() as u64;
    const NANOS_IN_MICROS: u64 = Duration::from_micros(1).as_nanos() as u64;

    pub const ZERO: Self = Self(0);

    const fn as_nanos(&self) -> u64 {
        self.0
    }

    pub const fn from_micros(micros: u64) -> Self {
        Self(micros * Self::NANOS_IN_MICROS)
    }

    pub const fn from_millis(millis: u64) -> Self {
        Self(millis * Self::NANOS_IN_MILLIS)
    }

    pub const fn from_secs(secs: u64) -> Self {
        Self(secs * Self::NANOS_IN_SECOND)
    }

    pub const fn as_secs(&self) -> u64 {
        self.0 / Self::NANOS_IN_SECOND
    }

    pub const fn subsec_micros(&self) -> u64 {
        self.0 % Self::NANOS_IN_SECOND / Self::NANOS_IN_MICROS
    }

    pub const fn saturating_sub(self, rhs: Self) -> Self {
        Self(self.0.saturating_sub(rhs.0))
    }
}

impl PartialEq<Duration> for Timestamp {
    fn eq(&self, other: &Duration) -> bool {
        self.0.eq(&(other.as_nanos() as u64))
    }
}

impl PartialEq<Timestamp> for Duration {
    fn eq(&self, other: &Timestamp) -> bool {
        other.eq(self)
    }
}

impl PartialOrd<Duration> for Timestamp {
    fn partial_cmp(&self, other: &Duration) -> Option<Ordering> {
        Some(self.0.cmp(&(other.as_nanos() as u64)))
    }
}

impl PartialOrd<Timestamp> for Duration {
    fn partial_cmp(&self, other: &Timestamp) -> Option<Ordering> {
        other.partial_cmp(self).map(Ordering::reverse)
    }
}

impl Add for Timestamp {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0.saturating_add(rhs.0))
    }
}

impl Add<Duration> for Timestamp {
    type Output = Self;

    fn add(self, rhs: Duration) -> Self::Output {
        self + Self::from(rhs)
    }
}

// Packet clocks may step backwards, so subtraction clamps at zero.
impl Sub for Timestamp {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        self.saturating_sub(rhs)
    }
}

impl Sub<Duration> for Timestamp {
    type Output = Self;

    fn sub(self, rhs: Duration) -> Self::Output {
        self - Self::from(rhs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conversion() {
        let d = Duration::from_secs(123);
        assert_eq!(d, Duration::from(Timestamp::from(d)));
        assert_eq!(Timestamp::from_millis(1500).as_secs(), 1);
        assert_eq!(Timestamp::from_micros(2_000_001).subsec_micros(), 1);
    }

    #[test]
    fn comparison() {
        let t = Timestamp::from_secs(10);
        assert!(t > Duration::from_secs(9));
        assert!(Duration::from_millis(10_001) > t);
        assert_eq!(t, Duration::from_secs(10));
    }

    #[test]
    fn subtraction_saturates() {
        let t = Timestamp::from_secs(1);
        assert_eq!(t - Timestamp::from_secs(3), Timestamp::ZERO);
        assert_eq!(t - Duration::from_millis(400), Timestamp::from_millis(600));
    }

    #[test]
    fn display() {
        assert_eq!(
            Timestamp::from(Duration::new(1_600_000_000, 123_456_789)).to_string(),
            "1600000000.123456"
        );
        assert_eq!(Timestamp::from_secs(3).to_string(), "3.0");
    }
}
