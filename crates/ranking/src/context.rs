//! Time-of-day viewing context.
//!
//! Each watch-hour bucket maps to the genres people tend to reach for at
//! that time. The personalized scorer pays a small bonus to movies that
//! match the user's habitual watch hour.

use catalog::Genre;
use engines::WatchHourBucket;

/// Genres favored during a given time-of-day bucket.
pub fn genres_for_bucket(bucket: WatchHourBucket) -> &'static [Genre] {
    match bucket {
        WatchHourBucket::Morning => &[Genre::Comedy, Genre::Animation, Genre::Family],
        WatchHourBucket::Afternoon => &[Genre::Action, Genre::Adventure, Genre::Family],
        WatchHourBucket::Evening => &[
            Genre::Drama,
            Genre::Thriller,
            Genre::Horror,
            Genre::Romance,
        ],
        WatchHourBucket::Night => &[Genre::Horror, Genre::Thriller, Genre::SciFi],
    }
}
