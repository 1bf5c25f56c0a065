//! NATS JetStream pull consumer for run triggers.

use async_nats::jetstream::{self, consumer::pull::Config as ConsumerConfig, Context};
use async_trait::async_trait;
use futures::StreamExt;

use crate::error::BrokerError;
use crate::ingress::{Delivery, TriggerSource};

type PullConsumer = jetstream::consumer::Consumer<jetstream::consumer::pull::Config>;

/// Run trigger source backed by a durable JetStream pull consumer.
pub struct NatsTriggerSource {
    consumer: PullConsumer,

    /// Stream name.
    stream: String,

    /// Subject run triggers are published on.
    subject: String,
}

impl NatsTriggerSource {
    /// Connect to NATS, ensure the stream exists and bind the durable consumer.
    pub async fn connect(
        nats_url: &str,
        stream: &str,
        subject: &str,
        consumer: &str,
    ) -> Result<Self, BrokerError> {
        let client = async_nats::connect(nats_url)
            .await
            .map_err(|e| BrokerError::Connection(e.to_string()))?;
        let js = jetstream::new(client);

        ensure_stream(&js, stream, subject).await?;
        let consumer = ensure_consumer(&js, stream, subject, consumer).await?;

        tracing::info!(
            nats_url = %nats_url,
            stream = %stream,
            subject = %subject,
            "Subscribed to run triggers"
        );

        Ok(Self {
            consumer,
            stream: stream.to_string(),
            subject: subject.to_string(),
        })
    }

    pub fn stream(&self) -> &str {
        &self.stream
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }
}

async fn ensure_stream(js: &Context, stream: &str, subject: &str) -> Result<(), BrokerError> {
    match js.get_stream(stream).await {
        Ok(_) => {
            tracing::debug!(stream = %stream, "Using existing NATS stream");
        }
        Err(_) => {
            let config = jetstream::stream::Config {
                name: stream.to_string(),
                subjects: vec![subject.to_string()],
                ..Default::default()
            };
            js.create_stream(config)
                .await
                .map_err(|e| BrokerError::JetStream(e.to_string()))?;
            tracing::info!(stream = %stream, "Created NATS stream");
        }
    }
    Ok(())
}

async fn ensure_consumer(
    js: &Context,
    stream: &str,
    subject: &str,
    consumer: &str,
) -> Result<PullConsumer, BrokerError> {
    let stream = js
        .get_stream(stream)
        .await
        .map_err(|e| BrokerError::JetStream(e.to_string()))?;

    match stream.get_consumer(consumer).await {
        Ok(existing) => Ok(existing),
        Err(_) => {
            let config = ConsumerConfig {
                durable_name: Some(consumer.to_string()),
                filter_subject: subject.to_string(),
                ..Default::default()
            };
            let created = stream
                .create_consumer(config)
                .await
                .map_err(|e| BrokerError::JetStream(e.to_string()))?;
            tracing::info!(consumer = %consumer, "Created NATS consumer");
            Ok(created)
        }
    }
}

#[async_trait]
impl TriggerSource for NatsTriggerSource {
    type Message = jetstream::Message;

    async fn receive(&self) -> Result<Option<Delivery<jetstream::Message>>, BrokerError> {
        let mut messages = self
            .consumer
            .fetch()
            .max_messages(1)
            .messages()
            .await
            .map_err(|e| BrokerError::JetStream(e.to_string()))?;

        match messages.next().await {
            Some(Ok(message)) => Ok(Some(Delivery {
                payload: message.payload.to_vec(),
                message,
            })),
            Some(Err(e)) => Err(BrokerError::JetStream(format!(
                "Failed to receive message: {}",
                e
            ))),
            None => Ok(None),
        }
    }

    async fn ack(&self, message: &jetstream::Message) -> Result<(), BrokerError> {
        message
            .ack()
            .await
            .map_err(|e| BrokerError::Ack(e.to_string()))
    }

    async fn nack(&self, message: &jetstream::Message) -> Result<(), BrokerError> {
        message
            .ack_with(jetstream::AckKind::Nak(None))
            .await
            .map_err(|e| BrokerError::Ack(e.to_string()))
    }
}
