//! Stroke Risk Service - Main Entry Point
//!
//! Loads the model artifacts, then answers prediction requests received
//! over NATS request/reply. Each request is scored on a blocking worker.

use anyhow::{Context, Result};
use futures::StreamExt;
use std::sync::Arc;
use std::time::Instant;
use stroke_risk_pipeline::{
    config::{AppConfig, LoggingConfig, DEFAULT_CONFIG_PATH},
    consumer::{decode_record, RequestConsumer},
    metrics::{MetricsReporter, PipelineMetrics},
    models::ModelRegistry,
    pipeline::RiskPipeline,
    producer::ReplyProducer,
    types::{ErrorResponse, PredictionResponse, Reply},
};
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

fn init_tracing(logging: &LoggingConfig) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(&logging.level))
        .context("Invalid log level")?;

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if logging.format == "json" {
        builder.json().init();
    } else {
        builder.init();
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
    let config = AppConfig::load_from_path(&config_path)?;
    init_tracing(&config.logging)?;

    info!(config = %config_path, "Starting Stroke Risk Service");

    // Artifacts are loaded exactly once; any failure stops start-up
    let classifier = config.classification.classifier()?;
    let registry = Arc::new(ModelRegistry::load(&config.models)?);
    let pipeline = RiskPipeline::new(registry.clone(), classifier);
    info!(
        base_models = ?registry.base_model_names(),
        features = registry.schema().len(),
        threshold = classifier.threshold(),
        "Pipeline ready"
    );

    let metrics = Arc::new(PipelineMetrics::new());
    if config.metrics.report_interval_secs > 0 {
        let reporter = MetricsReporter::new(metrics.clone(), config.metrics.report_interval_secs);
        tokio::spawn(reporter.start());
    }

    let client = async_nats::connect(&config.nats.url).await?;
    info!("Connected to NATS at {}", config.nats.url);

    let consumer = RequestConsumer::new(client.clone(), &config.nats.request_subject);
    let producer = ReplyProducer::new(client.clone(), &config.nats.response_subject);

    let num_workers = config.pipeline.workers.max(1);
    info!(
        workers = num_workers,
        subject = %consumer.subject(),
        fallback = %producer.fallback_subject(),
        "Listening for prediction requests"
    );

    // Bounds how many requests are scored at once
    let semaphore = Arc::new(Semaphore::new(num_workers));
    let mut subscription = consumer.subscribe().await?;

    while let Some(message) = subscription.next().await {
        let permit = semaphore.clone().acquire_owned().await?;

        let pipeline = pipeline.clone();
        let producer = producer.clone();
        let metrics = metrics.clone();

        tokio::spawn(async move {
            let request_id = Uuid::new_v4();
            let start_time = Instant::now();

            let reply = match decode_record(&message.payload) {
                Ok(record) => {
                    let scored = tokio::task::spawn_blocking(move || pipeline.predict(&record)).await;
                    let processing_time = start_time.elapsed();

                    match scored {
                        Ok(Ok(result)) => {
                            metrics.record_prediction(processing_time, result.probability, result.label);
                            metrics.record_model_scores(&result.model_scores);
                            info!(
                                request_id = %request_id,
                                risk_probability = result.probability,
                                risk_level = result.label.as_str(),
                                processing_time_us = processing_time.as_micros(),
                                "Prediction successful"
                            );
                            Reply::Prediction(PredictionResponse::new(request_id, &result))
                        }
                        Ok(Err(e)) => {
                            if e.is_client_error() {
                                metrics.record_rejection(processing_time);
                                warn!(request_id = %request_id, error = %e, "Invalid input data");
                            } else {
                                metrics.record_failure(processing_time, e.failing_model());
                                error!(request_id = %request_id, error = %e, "Prediction failed");
                            }
                            Reply::Error(ErrorResponse::from_pipeline_error(request_id, &e))
                        }
                        Err(e) => {
                            metrics.record_failure(processing_time, None);
                            error!(request_id = %request_id, error = %e, "Pipeline worker panicked");
                            Reply::Error(ErrorResponse::internal(request_id))
                        }
                    }
                }
                Err(e) => {
                    metrics.record_rejection(start_time.elapsed());
                    warn!(request_id = %request_id, error = ?e, "Rejected request payload");
                    Reply::Error(ErrorResponse::bad_request(request_id, e.public_message()))
                }
            };

            if let Err(e) = producer.publish(message.reply.clone(), &reply).await {
                error!(request_id = %request_id, error = %e, "Failed to publish reply");
            } else {
                debug!(request_id = %request_id, "Reply published");
            }

            drop(permit);
        });
    }

    info!("Subscription closed, shutting down");
    metrics.print_summary();

    Ok(())
}
