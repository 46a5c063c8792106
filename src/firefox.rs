use std::{
    path::Path,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use fxprof_processed_profile::{
    CounterHandle, ProcessHandle, Profile, ReferenceTimestamp, SamplingInterval, ThreadHandle,
    Timestamp,
};
use serde_json::Error as SerdeError;

use crate::series::StoreSeries;

const SIZE_CATEGORY: &str = "Memory";
const COUNT_CATEGORY: &str = "Objects";

/// Wrapper around `fxprof_processed_profile::Profile` holding one counter per
/// sampled series.
#[derive(Debug)]
pub struct FirefoxProfile {
    inner: Profile,
}

impl FirefoxProfile {
    /// Build a Firefox profile from the recorded count and size series.
    pub fn from_series(series: &StoreSeries, product: &str) -> Self {
        let mut builder = FirefoxProfileBuilder::new(product, series.times.first().copied());
        for (name, sizes) in &series.size {
            builder.add_series(
                name,
                SIZE_CATEGORY,
                "Estimated bytes",
                &series.times,
                sizes,
            );
        }
        for (name, counts) in &series.objects {
            builder.add_series(
                &format!("{name} (objects)"),
                COUNT_CATEGORY,
                "Number of entities",
                &series.times,
                counts,
            );
        }
        Self {
            inner: builder.finish(),
        }
    }

    /// Serialize the Firefox profile to the given JSON file path.
    pub fn write_json<P: AsRef<Path>>(&self, path: P) -> std::io::Result<()> {
        let writer = std::io::BufWriter::new(std::fs::File::create(path)?);
        serde_json::to_writer(writer, &self.inner).map_err(std::io::Error::other)
    }

    /// Serialize the profile into a JSON string.
    pub fn to_json_string(&self) -> Result<String, SerdeError> {
        serde_json::to_string(&self.inner)
    }
}

struct FirefoxProfileBuilder {
    profile: Profile,
    process: ProcessHandle,
    thread: ThreadHandle,
    first_time: f64,
    last_timestamp: Timestamp,
}

impl FirefoxProfileBuilder {
    fn new(product: &str, first_time: Option<f64>) -> Self {
        let reference = match first_time {
            Some(t) if t.is_finite() && t >= 0.0 => UNIX_EPOCH + Duration::from_secs_f64(t),
            _ => SystemTime::now(),
        };
        let mut profile = Profile::new(
            product,
            ReferenceTimestamp::from(reference),
            SamplingInterval::from_millis(1),
        );

        let start = Timestamp::from_millis_since_reference(0.0);
        let process = profile.add_process(product, 1, start);
        let thread = profile.add_thread(process, 1, start, true);
        profile.set_thread_name(thread, "Sampler");
        profile.add_initial_visible_thread(thread);
        profile.add_initial_selected_thread(thread);

        Self {
            profile,
            process,
            thread,
            first_time: first_time.unwrap_or(0.0),
            last_timestamp: start,
        }
    }

    fn add_series(
        &mut self,
        name: &str,
        category: &str,
        description: &str,
        times: &[f64],
        values: &[usize],
    ) {
        let counter: CounterHandle = self
            .profile
            .add_counter(self.process, name, category, description);

        // Counter samples carry the change since the previous sample.
        let mut previous = 0.0;
        for (&time, &value) in times.iter().zip(values) {
            let timestamp =
                Timestamp::from_millis_since_reference((time - self.first_time) * 1000.0);
            let value = value as f64;
            self.profile
                .add_counter_sample(counter, timestamp, value - previous, 1);
            previous = value;
            self.last_timestamp = timestamp;
        }
    }

    fn finish(mut self) -> Profile {
        self.profile
            .set_process_end_time(self.process, self.last_timestamp);
        self.profile
            .set_thread_end_time(self.thread, self.last_timestamp);
        self.profile
    }
}
