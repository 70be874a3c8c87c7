//! Reservations and their expiry representations.

use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};

use crate::clock::{Clock, SystemClock};
use crate::error::ReservationError;
use crate::resources::ResourceMap;

/// When a reservation stops counting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expiry {
    /// An absolute instant.
    At(DateTime<Utc>),

    /// A duration measured from the moment the reservation is built.
    After(Duration),
}

impl Expiry {
    /// Relative expiry of whole seconds.
    pub fn from_secs(secs: i64) -> Result<Self, ReservationError> {
        Duration::try_seconds(secs)
            .map(Self::After)
            .ok_or_else(|| ReservationError::OutOfRange(format!("{secs}s")))
    }

    /// Relative expiry of fractional seconds, kept to nanosecond precision.
    ///
    /// NaN and infinities are rejected as invalid expiry values.
    pub fn from_secs_f64(secs: f64) -> Result<Self, ReservationError> {
        if !secs.is_finite() {
            return Err(ReservationError::invalid(secs));
        }

        let nanos = (secs * 1e9).round();
        if nanos.abs() >= i64::MAX as f64 {
            return Err(ReservationError::OutOfRange(format!("{secs}s")));
        }

        Ok(Self::After(Duration::nanoseconds(nanos as i64)))
    }

    /// Resolve to an absolute instant, measuring relative expiries from `now`.
    pub fn resolve(&self, now: DateTime<Utc>) -> Result<DateTime<Utc>, ReservationError> {
        match *self {
            Self::At(instant) => Ok(instant),
            Self::After(delta) => now
                .checked_add_signed(delta)
                .ok_or_else(|| ReservationError::OutOfRange(format!("{now} + {delta}"))),
        }
    }
}

impl From<DateTime<Utc>> for Expiry {
    fn from(instant: DateTime<Utc>) -> Self {
        Self::At(instant)
    }
}

impl From<Duration> for Expiry {
    fn from(delta: Duration) -> Self {
        Self::After(delta)
    }
}

impl TryFrom<std::time::Duration> for Expiry {
    type Error = ReservationError;

    fn try_from(delta: std::time::Duration) -> Result<Self, Self::Error> {
        Duration::from_std(delta)
            .map(Self::After)
            .map_err(|_| ReservationError::OutOfRange(format!("{delta:?}")))
    }
}

/// Parses `"15"`, `"1.5"` (seconds from now) or an RFC 3339 instant.
impl FromStr for Expiry {
    type Err = ReservationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(ReservationError::invalid(s));
        }

        if let Ok(secs) = s.parse::<i64>() {
            return Self::from_secs(secs);
        }

        if let Ok(secs) = s.parse::<f64>() {
            return Self::from_secs_f64(secs).map_err(|e| match e {
                ReservationError::InvalidExpiry { .. } => ReservationError::invalid(s),
                other => other,
            });
        }

        DateTime::parse_from_rfc3339(s)
            .map(|instant| Self::At(instant.with_timezone(&Utc)))
            .map_err(|_| ReservationError::invalid(s))
    }
}

/// Resources held back until an expiration instant.
///
/// Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reservation {
    expire_at: DateTime<Utc>,
    resources: ResourceMap,
}

impl Reservation {
    /// Build a reservation, resolving a relative expiry against the system clock.
    pub fn new(expiry: Expiry, resources: ResourceMap) -> Result<Self, ReservationError> {
        Self::with_clock(&SystemClock, expiry, resources)
    }

    /// Build a reservation, resolving a relative expiry against `clock`.
    ///
    /// The clock is read at most once.
    pub fn with_clock<C: Clock + ?Sized>(
        clock: &C,
        expiry: Expiry,
        resources: ResourceMap,
    ) -> Result<Self, ReservationError> {
        let expire_at = match expiry {
            Expiry::At(instant) => instant,
            Expiry::After(_) => expiry.resolve(clock.now())?,
        };

        Ok(Self::expiring_at(expire_at, resources))
    }

    /// Build a reservation with an absolute expiration instant.
    pub fn expiring_at(expire_at: DateTime<Utc>, resources: ResourceMap) -> Self {
        Self {
            expire_at,
            resources,
        }
    }

    pub fn expire_at(&self) -> DateTime<Utc> {
        self.expire_at
    }

    pub fn resources(&self) -> &ResourceMap {
        &self.resources
    }

    /// A reservation stops counting at its expiration instant, inclusive.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expire_at <= now
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::TimeZone;
    use rstest::rstest;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    fn abc() -> ResourceMap {
        [("a", 1), ("b", 2), ("c", 3)].into_iter().collect()
    }

    #[test]
    fn test_absolute_expiry_is_kept() {
        let reservation = Reservation::expiring_at(start(), abc());
        assert_eq!(reservation.expire_at(), start());
        assert_eq!(reservation.resources(), &abc());
    }

    #[test]
    fn test_absolute_expiry_does_not_need_clock() {
        let clock = ManualClock::new(start() + Duration::days(365));
        let reservation = Reservation::with_clock(&clock, Expiry::At(start()), abc()).unwrap();
        assert_eq!(reservation.expire_at(), start());
    }

    #[test]
    fn test_duration_expiry() {
        let clock = ManualClock::new(start());
        let expiry = Expiry::from(Duration::seconds(15));
        let reservation = Reservation::with_clock(&clock, expiry, abc()).unwrap();

        assert_eq!(reservation.expire_at(), start() + Duration::seconds(15));
        assert_eq!(reservation.resources(), &abc());
    }

    #[test]
    fn test_integer_seconds_expiry() {
        let clock = ManualClock::new(start());
        let expiry = Expiry::from_secs(15).unwrap();
        let reservation = Reservation::with_clock(&clock, expiry, abc()).unwrap();

        assert_eq!(reservation.expire_at(), start() + Duration::seconds(15));
    }

    #[test]
    fn test_fractional_seconds_expiry() {
        let clock = ManualClock::new(start());
        let expiry = Expiry::from_secs_f64(1.5).unwrap();
        let reservation = Reservation::with_clock(&clock, expiry, abc()).unwrap();

        assert_eq!(reservation.expire_at(), start() + Duration::milliseconds(1500));
    }

    #[test]
    fn test_std_duration_expiry() {
        let expiry = Expiry::try_from(std::time::Duration::from_millis(2500)).unwrap();
        assert_eq!(expiry, Expiry::After(Duration::milliseconds(2500)));
    }

    #[test]
    fn test_negative_duration_is_already_expired() {
        let clock = ManualClock::new(start());
        let expiry = Expiry::from_secs(-2).unwrap();
        let reservation = Reservation::with_clock(&clock, expiry, abc()).unwrap();

        assert!(reservation.is_expired_at(start()));
    }

    #[test]
    fn test_expired_at_boundary() {
        let reservation = Reservation::expiring_at(start(), abc());
        assert!(!reservation.is_expired_at(start() - Duration::nanoseconds(1)));
        assert!(reservation.is_expired_at(start()));
    }

    #[rstest]
    #[case(f64::NAN)]
    #[case(f64::INFINITY)]
    #[case(f64::NEG_INFINITY)]
    fn test_non_finite_seconds_rejected(#[case] secs: f64) {
        let err = Expiry::from_secs_f64(secs).unwrap_err();
        assert!(err.is_invalid_expiry());
    }

    #[test]
    fn test_huge_seconds_out_of_range() {
        assert!(matches!(
            Expiry::from_secs(i64::MAX),
            Err(ReservationError::OutOfRange(_))
        ));
        assert!(matches!(
            Expiry::from_secs_f64(1e300),
            Err(ReservationError::OutOfRange(_))
        ));
    }

    #[test]
    fn test_resolve_overflow_is_out_of_range() {
        let expiry = Expiry::After(Duration::days(365 * 1_000_000));
        let err = expiry.resolve(DateTime::<Utc>::MAX_UTC).unwrap_err();
        assert!(!err.is_invalid_expiry());
    }

    #[rstest]
    #[case("15", Expiry::After(Duration::seconds(15)))]
    #[case(" 0 ", Expiry::After(Duration::zero()))]
    #[case("-3", Expiry::After(Duration::seconds(-3)))]
    #[case("1.5", Expiry::After(Duration::milliseconds(1500)))]
    #[case("2024-01-01T00:00:00Z", Expiry::At(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()))]
    #[case("2024-01-01T02:00:00+02:00", Expiry::At(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()))]
    fn test_parse_expiry(#[case] input: &str, #[case] expected: Expiry) {
        assert_eq!(input.parse::<Expiry>().unwrap(), expected);
    }

    #[rstest]
    #[case("")]
    #[case("soon")]
    #[case("NaN")]
    #[case("inf")]
    #[case("2024-13-01T00:00:00Z")]
    fn test_parse_invalid_expiry(#[case] input: &str) {
        let err = input.parse::<Expiry>().unwrap_err();
        assert!(err.is_invalid_expiry(), "{input:?} gave {err}");
        assert!(err.to_string().starts_with("invalid expiry value"));
    }
}
