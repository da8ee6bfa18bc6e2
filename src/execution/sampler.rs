use chrono::{DateTime, FixedOffset};
use tracing::info;
use crate::data::price_source::PriceSource;
use crate::monitoring::logger::{ObservationLog, StorageError};
use crate::strategies::spread::ObservationBuilder;
use crate::strategies::types::Observation;

/// One sample: both venues, one observation, one appended row.
pub struct Sampler {
    venue_a: PriceSource,
    venue_b: PriceSource,
    builder: ObservationBuilder,
    log: ObservationLog,
}

impl Sampler {
    pub fn new(
        venue_a: PriceSource,
        venue_b: PriceSource,
        builder: ObservationBuilder,
        log: ObservationLog,
    ) -> Self {
        Self {
            venue_a,
            venue_b,
            builder,
            log,
        }
    }

    pub fn log(&self) -> &ObservationLog {
        &self.log
    }

    /// Fetches cannot fail; only the append can.
    pub async fn run_cycle(&self, now: DateTime<FixedOffset>) -> Result<Observation, StorageError> {
        let (quote_a, quote_b) = tokio::join!(self.venue_a.fetch(), self.venue_b.fetch());

        let observation = self.builder.build(&quote_a, &quote_b, now);
        self.log.append(&observation)?;

        let status = if observation.action.is_opportunity() { "opportunity" } else { "no opportunity" };
        info!(
            "[{}] spread {:.2}% -> {} ({}) | est. profit ${:.2}{}",
            observation.captured_at.format("%H:%M"),
            observation.spread * 100.0,
            status,
            observation.action,
            observation.estimated_profit,
            simulated_note(&observation),
        );

        Ok(observation)
    }
}

fn simulated_note(observation: &Observation) -> &'static str {
    match (observation.venue_a_simulated, observation.venue_b_simulated) {
        (false, false) => "",
        (true, false) => " [A simulated]",
        (false, true) => " [B simulated]",
        (true, true) => " [A+B simulated]",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use crate::config::StrategyConfig;
    use crate::data::price_source::tests::FixedProvider;
    use crate::data::price_source::SimulatedQuote;
    use crate::data::types::Venue;
    use crate::strategies::types::Action;

    fn source(venue: Venue, quote: Option<(f64, f64)>) -> PriceSource {
        PriceSource::with_seed(
            Box::new(FixedProvider { venue, quote }),
            SimulatedQuote::new(0.42, 0.58, 500, 5000),
            1,
        )
    }

    fn now() -> DateTime<FixedOffset> {
        FixedOffset::east_opt(0).unwrap().with_ymd_and_hms(2026, 4, 2, 12, 0, 10).unwrap()
    }

    #[tokio::test]
    async fn test_cycle_appends_one_row() {
        let dir = tempfile::tempdir().unwrap();
        let log = ObservationLog::new(dir.path().join("log.csv"));
        log.ensure_initialized().unwrap();

        let sampler = Sampler::new(
            source(Venue::A, Some((0.40, 1000.0))),
            source(Venue::B, Some((0.46, 2000.0))),
            ObservationBuilder::new(StrategyConfig::default()),
            log,
        );

        let obs = sampler.run_cycle(now()).await.unwrap();
        assert_eq!(obs.action, Action::BuyASellB);
        assert_eq!(obs.estimated_profit, 4.5);

        let rows = sampler.log().read_all().unwrap();
        assert_eq!(rows, vec![obs]);
    }

    #[tokio::test]
    async fn test_venue_outage_still_produces_a_row() {
        let dir = tempfile::tempdir().unwrap();
        let log = ObservationLog::new(dir.path().join("log.csv"));
        log.ensure_initialized().unwrap();

        let sampler = Sampler::new(
            source(Venue::A, None),
            source(Venue::B, Some((0.50, 300.0))),
            ObservationBuilder::new(StrategyConfig::default()),
            log,
        );

        let obs = sampler.run_cycle(now()).await.unwrap();
        assert!(obs.venue_a_simulated);
        assert!(!obs.venue_b_simulated);
        assert!((0.42..=0.58).contains(&obs.venue_a_price));
        assert!((500..5000).contains(&obs.venue_a_volume));

        assert_eq!(sampler.log().read_all().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_unwritable_log_is_a_storage_error() {
        let dir = tempfile::tempdir().unwrap();
        // never initialized
        let log = ObservationLog::new(dir.path().join("missing").join("log.csv"));

        let sampler = Sampler::new(
            source(Venue::A, Some((0.5, 0.0))),
            source(Venue::B, Some((0.5, 0.0))),
            ObservationBuilder::new(StrategyConfig::default()),
            log,
        );

        assert!(sampler.run_cycle(now()).await.is_err());
    }
}
