//! Test Request Generator
//!
//! Sends random patient records to the risk service over NATS request/reply
//! and logs the replies. A share of the records is deliberately invalid.

use rand::Rng;
use std::time::Duration;
use stroke_risk_pipeline::types::{PatientRecord, Reply};
use tracing::{info, warn};

const WORK_TYPES: [&str; 5] = ["Govt_job", "Never_worked", "Private", "Self-employed", "children"];
const SMOKING: [&str; 4] = ["formerly smoked", "never smoked", "smokes", "Unknown"];

/// Patient record generator for testing
struct RecordGenerator {
    rng: rand::rngs::ThreadRng,
}

impl RecordGenerator {
    fn new() -> Self {
        Self {
            rng: rand::thread_rng(),
        }
    }

    /// Generate a random record that passes validation
    fn generate_valid(&mut self) -> PatientRecord {
        let age: f64 = self.rng.gen_range(1.0..90.0);
        let elderly = age > 60.0;

        let record = PatientRecord::new()
            .with("age", (age * 10.0).round() / 10.0)
            .with("gender", self.random_choice(&["Male", "Female", "male", "female"]))
            .with("hypertension", u8::from(self.rng.gen_bool(if elderly { 0.3 } else { 0.05 })))
            .with("heart_disease", u8::from(self.rng.gen_bool(if elderly { 0.2 } else { 0.03 })))
            .with("ever_married", self.random_choice(&["Yes", "No"]))
            .with("work_type", self.random_choice(&WORK_TYPES))
            .with("Residence_type", self.random_choice(&["Urban", "Rural"]))
            .with("avg_glucose_level", self.rng.gen_range(55.0..270.0_f64).round())
            .with("smoking_status", self.random_choice(&SMOKING));

        // Some callers send bmi as a string, some leave it unparseable
        match self.rng.gen_range(0..10) {
            0 => record.with("bmi", "N/A"),
            1 => record.with("bmi", format!("{:.1}", self.rng.gen_range(15.0..45.0_f64))),
            _ => record.with("bmi", (self.rng.gen_range(15.0..45.0_f64) * 10.0).round() / 10.0),
        }
    }

    /// Generate a record the service must reject
    fn generate_invalid(&mut self) -> PatientRecord {
        let mut record = self.generate_valid();
        match self.rng.gen_range(0..3) {
            0 => {
                record.remove("bmi");
                record
            }
            1 => record.with("work_type", "Invalid"),
            _ => record.with("gender", "unknown"),
        }
    }

    fn random_choice<'a>(&mut self, choices: &[&'a str]) -> &'a str {
        choices[self.rng.gen_range(0..choices.len())]
    }
}

/// Share of deliberately invalid requests; defaults to 0.1.
fn parse_invalid_rate(arg: Option<&str>) -> anyhow::Result<f64> {
    let rate = arg.and_then(|s| s.parse().ok()).unwrap_or(0.1);
    if !(0.0..=1.0).contains(&rate) {
        anyhow::bail!("invalid rate {} must lie in [0, 1]", rate);
    }
    Ok(rate)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("test_requester=info".parse()?),
        )
        .init();

    info!("Starting Test Request Generator");

    let args: Vec<String> = std::env::args().collect();
    let nats_url = args.get(1).map(|s| s.as_str()).unwrap_or("nats://localhost:4222");
    let subject = args.get(2).map(|s| s.as_str()).unwrap_or("stroke.predict");
    let count: u64 = args.get(3).and_then(|s| s.parse().ok()).unwrap_or(100);
    let invalid_rate = parse_invalid_rate(args.get(4).map(|s| s.as_str()))?;
    let delay_ms: u64 = args.get(5).and_then(|s| s.parse().ok()).unwrap_or(100);

    info!(
        nats_url = %nats_url,
        subject = %subject,
        count = count,
        invalid_rate = invalid_rate,
        delay_ms = delay_ms,
        "Configuration loaded"
    );

    let client = match async_nats::connect(nats_url).await {
        Ok(c) => {
            info!("Connected to NATS");
            c
        }
        Err(e) => {
            warn!(error = %e, "Failed to connect to NATS. Running in dry-run mode.");
            return run_dry_mode(count, invalid_rate, delay_ms).await;
        }
    };

    let mut generator = RecordGenerator::new();
    let mut rng = rand::thread_rng();
    let (mut high, mut low, mut client_errors, mut server_errors) = (0u64, 0u64, 0u64, 0u64);

    for i in 0..count {
        let record = if rng.gen_bool(invalid_rate) {
            generator.generate_invalid()
        } else {
            generator.generate_valid()
        };
        let payload = serde_json::to_vec(&record)?;

        let response = client.request(subject.to_string(), payload.into()).await?;
        match serde_json::from_slice::<Reply>(&response.payload)? {
            Reply::Prediction(p) => {
                match p.risk_level {
                    stroke_risk_pipeline::RiskLevel::High => high += 1,
                    stroke_risk_pipeline::RiskLevel::Low => low += 1,
                }
                info!(
                    request = i + 1,
                    risk_probability = p.risk_probability,
                    risk_level = p.risk_level.as_str(),
                    "Prediction"
                );
            }
            Reply::Error(e) if e.is_client_error() => {
                client_errors += 1;
                info!(request = i + 1, status = e.status, error = %e.error, "Rejected");
            }
            Reply::Error(e) => {
                server_errors += 1;
                warn!(request = i + 1, status = e.status, error = %e.error, model = ?e.model, "Server error");
            }
        }

        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
    }

    info!(
        "Completed {} requests: {} high, {} low, {} rejected, {} server errors",
        count, high, low, client_errors, server_errors
    );

    Ok(())
}

async fn run_dry_mode(count: u64, invalid_rate: f64, delay_ms: u64) -> anyhow::Result<()> {
    info!("Running in dry-run mode (no NATS connection)");

    let mut generator = RecordGenerator::new();
    let mut rng = rand::thread_rng();

    for i in 0..count {
        let record = if rng.gen_bool(invalid_rate) {
            generator.generate_invalid()
        } else {
            generator.generate_valid()
        };

        if (i + 1) % 10 == 0 || i == 0 {
            info!("Sample record {}:\n{}", i + 1, serde_json::to_string_pretty(&record)?);
        }

        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_rate_bounds() {
        assert_eq!(parse_invalid_rate(None).unwrap(), 0.1);
        assert_eq!(parse_invalid_rate(Some("0.25")).unwrap(), 0.25);
        assert_eq!(parse_invalid_rate(Some("1")).unwrap(), 1.0);
        assert!(parse_invalid_rate(Some("1.5")).is_err());
        assert!(parse_invalid_rate(Some("-0.2")).is_err());
        assert!(parse_invalid_rate(Some("NaN")).is_err());
    }
}
