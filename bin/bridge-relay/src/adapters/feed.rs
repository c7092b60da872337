use bridge_relay::ports::{
    HostNode,
    HostNotification,
};
use fuel_core_services::stream::{
    BoxStream,
    IntoBoxStream,
};
use std::path::PathBuf;
use tokio::{
    io::{
        AsyncBufRead,
        AsyncBufReadExt,
        BufReader,
    },
    sync::mpsc,
};
use tokio_stream::wrappers::ReceiverStream;

const CHANNEL_CAPACITY: usize = 1024;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FeedSource {
    Stdin,
    File(PathBuf),
}

/// Host notifications encoded as one JSON object per line.
///
/// Every call to `notifications` spawns a reader over the source. Lines that
/// do not decode are logged and skipped.
#[derive(Clone, Debug)]
pub struct NdjsonFeed {
    source: FeedSource,
}

impl NdjsonFeed {
    pub fn stdin() -> Self {
        Self {
            source: FeedSource::Stdin,
        }
    }

    pub fn file(path: PathBuf) -> Self {
        Self {
            source: FeedSource::File(path),
        }
    }

    pub fn source(&self) -> &FeedSource {
        &self.source
    }
}

impl HostNode for NdjsonFeed {
    fn notifications(&self) -> BoxStream<HostNotification> {
        let (sender, receiver) = mpsc::channel(CHANNEL_CAPACITY);
        let source = self.source.clone();
        tokio::spawn(async move {
            if let Err(err) = read_source(&source, sender).await {
                tracing::error!("Failed to read host notifications from {source:?}: {err}");
            }
        });
        ReceiverStream::new(receiver).into_boxed()
    }
}

async fn read_source(
    source: &FeedSource,
    sender: mpsc::Sender<HostNotification>,
) -> anyhow::Result<()> {
    match source {
        FeedSource::Stdin => forward_lines(BufReader::new(tokio::io::stdin()), sender).await,
        FeedSource::File(path) => {
            let file = tokio::fs::File::open(path).await?;
            forward_lines(BufReader::new(file), sender).await
        }
    }
}

async fn forward_lines<R>(
    reader: R,
    sender: mpsc::Sender<HostNotification>,
) -> anyhow::Result<()>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut line_number = 0usize;
    while let Some(line) = lines.next_line().await? {
        line_number = line_number.saturating_add(1);
        let line = line.trim();
        if line.is_empty() {
            continue
        }
        match serde_json::from_str::<HostNotification>(line) {
            Ok(notification) => {
                if sender.send(notification).await.is_err() {
                    tracing::debug!("The relay stopped listening to host notifications");
                    break
                }
            }
            Err(err) => {
                tracing::warn!("Skipping malformed host notification on line {line_number}: {err}");
            }
        }
    }
    Ok(())
}

#[allow(non_snake_case)]
#[cfg(test)]
mod tests {
    use super::*;
    use bridge_relay::test_helpers::scenario_notifications;
    use futures::StreamExt;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    fn ndjson(notifications: &[HostNotification]) -> String {
        notifications
            .iter()
            .map(|notification| serde_json::to_string(notification).unwrap())
            .collect::<Vec<_>>()
            .join("\n")
    }

    #[tokio::test]
    async fn feed__file__yields_every_notification_in_order() {
        // Given
        let expected: Vec<_> = scenario_notifications().into_iter().take(10).collect();
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(ndjson(&expected).as_bytes()).unwrap();
        let feed = NdjsonFeed::file(file.path().to_path_buf());

        // When
        let actual: Vec<_> = feed.notifications().collect().await;

        // Then
        assert_eq!(actual, expected);
    }

    #[tokio::test]
    async fn feed__malformed_and_blank_lines__are_skipped() {
        // Given
        let notifications: Vec<_> = scenario_notifications().into_iter().take(2).collect();
        let contents = format!(
            "{}\n\n{{\"type\":\"unknown\"}}\nnot json\n{}\n",
            serde_json::to_string(&notifications[0]).unwrap(),
            serde_json::to_string(&notifications[1]).unwrap(),
        );
        let (sender, receiver) = mpsc::channel(16);

        // When
        forward_lines(contents.as_bytes(), sender).await.unwrap();
        let actual: Vec<_> = ReceiverStream::new(receiver).collect().await;

        // Then
        assert_eq!(actual, notifications);
    }

    #[tokio::test]
    async fn feed__missing_file__ends_stream() {
        let dir = tempfile::tempdir().unwrap();
        let feed = NdjsonFeed::file(dir.path().join("missing.ndjson"));

        let actual: Vec<_> = feed.notifications().collect().await;

        assert!(actual.is_empty());
    }

    #[tokio::test]
    async fn feed__dropped_receiver__stops_reading() {
        let notifications: Vec<_> = scenario_notifications().into_iter().take(3).collect();
        let contents = ndjson(&notifications);
        let (sender, receiver) = mpsc::channel(1);
        drop(receiver);

        let result = forward_lines(contents.as_bytes(), sender).await;

        assert!(result.is_ok());
    }
}
