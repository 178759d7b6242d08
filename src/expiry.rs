use std::time::Duration;

use cookie::Cookie;
use time::OffsetDateTime;

const NANOS_PER_SEC: i128 = 1_000_000_000;

/// When a written session stops being readable.
///
/// Expiry values are always persisted as whole Unix seconds; sub-second
/// timestamps are rounded to the nearest second.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Expiry {
    /// Now plus the table's configured expiration.
    #[default]
    Default,
    /// Now plus the given duration.
    After(Duration),
    /// An absolute point in time.
    At(OffsetDateTime),
}

impl Expiry {
    /// Derives an expiry from a session cookie.
    ///
    /// An absolute `Expires` attribute wins over `Max-Age`. A cookie carrying
    /// neither yields [`Expiry::Default`].
    pub fn from_cookie(cookie: &Cookie<'_>) -> Self {
        if let Some(expires) = cookie.expires_datetime() {
            return Expiry::At(expires);
        }

        match cookie.max_age() {
            Some(age) => Expiry::At(OffsetDateTime::now_utc().saturating_add(age)),
            None => Expiry::Default,
        }
    }

    /// Resolves to whole Unix seconds, using `default` for [`Expiry::Default`].
    pub fn resolve(&self, default: Duration) -> i64 {
        match self {
            Expiry::Default => seconds_hence(default),
            Expiry::After(duration) => seconds_hence(*duration),
            Expiry::At(at) => to_epoch_seconds(*at),
        }
    }
}

impl From<Duration> for Expiry {
    fn from(duration: Duration) -> Self {
        Expiry::After(duration)
    }
}

impl From<OffsetDateTime> for Expiry {
    fn from(at: OffsetDateTime) -> Self {
        Expiry::At(at)
    }
}

impl From<Option<OffsetDateTime>> for Expiry {
    fn from(at: Option<OffsetDateTime>) -> Self {
        at.map(Expiry::At).unwrap_or_default()
    }
}

/// The current wall-clock time in whole Unix seconds.
pub fn now_seconds() -> i64 {
    to_epoch_seconds(OffsetDateTime::now_utc())
}

/// Whole Unix seconds `duration` from now, saturating at `i64::MAX`.
pub fn seconds_hence(duration: Duration) -> i64 {
    let nanos = OffsetDateTime::now_utc().unix_timestamp_nanos() + duration.as_nanos() as i128;
    round_nanos(nanos)
}

/// Rounds a timestamp to the nearest whole Unix second.
pub fn to_epoch_seconds(at: OffsetDateTime) -> i64 {
    round_nanos(at.unix_timestamp_nanos())
}

fn round_nanos(nanos: i128) -> i64 {
    let seconds = (nanos + NANOS_PER_SEC / 2).div_euclid(NANOS_PER_SEC);
    seconds.clamp(i64::MIN.into(), i64::MAX.into()) as i64
}
