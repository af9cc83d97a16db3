#![allow(clippy::disallowed_methods)]

mod common;

use std::error::Error;
use std::time::Duration;

use relay::{MemoryRelay, RelayChannel, RelayConfig, RelayError};

const WAIT: Duration = Duration::from_secs(2);

#[tokio::test]
async fn test_publish_without_subscribers_is_dropped() -> Result<(), Box<dyn Error>> {
    let relay = MemoryRelay::default();

    let delivered = relay.publish("job-1", "early".to_string()).await?;
    assert_eq!(delivered, 0);

    // Nothing is replayed to a late subscriber.
    let mut subscription = relay.subscribe("job-1").await?;
    relay.publish("job-1", "late".to_string()).await?;
    assert_eq!(
        common::next_within(&mut subscription, WAIT).await,
        Some(Ok("late".to_string()))
    );

    let stats = relay.stats();
    assert_eq!(stats.dropped, 1);
    assert_eq!(stats.published, 1);
    Ok(())
}

#[tokio::test]
async fn test_order_is_preserved_per_topic() -> Result<(), Box<dyn Error>> {
    let relay = MemoryRelay::default();
    let mut first = relay.subscribe("job").await?;
    let mut second = relay.subscribe("job").await?;
    let mut other = relay.subscribe("other").await?;

    for n in 0..5 {
        assert_eq!(relay.publish("job", format!("m{n}")).await?, 2);
    }
    relay.publish("other", "x".to_string()).await?;

    for n in 0..5 {
        let expected = Some(Ok(format!("m{n}")));
        assert_eq!(common::next_within(&mut first, WAIT).await, expected);
        assert_eq!(common::next_within(&mut second, WAIT).await, expected);
    }
    assert_eq!(
        common::next_within(&mut other, WAIT).await,
        Some(Ok("x".to_string()))
    );
    Ok(())
}

#[tokio::test]
async fn test_release_is_idempotent_and_removes_topic() -> Result<(), Box<dyn Error>> {
    let relay = MemoryRelay::default();
    let mut subscription = relay.subscribe("job").await?;
    assert_eq!(relay.subscriber_count("job"), 1);
    assert_eq!(relay.stats().topics, 1);

    subscription.release();
    subscription.release();
    assert!(subscription.is_released());
    assert_eq!(subscription.next_message().await, None);
    drop(subscription);

    let stats = relay.stats();
    assert_eq!(stats.releases, 1);
    assert_eq!(stats.topics, 0);
    assert_eq!(relay.publish("job", "gone".to_string()).await?, 0);
    Ok(())
}

#[tokio::test]
async fn test_drop_releases_subscription() -> Result<(), Box<dyn Error>> {
    let relay = MemoryRelay::default();
    let keep = relay.subscribe("job").await?;
    {
        let _dropped = relay.subscribe("job").await?;
        assert_eq!(relay.subscriber_count("job"), 2);
    }
    assert_eq!(relay.subscriber_count("job"), 1);
    assert_eq!(relay.stats().releases, 1);

    drop(keep);
    assert_eq!(relay.subscriber_count("job"), 0);
    assert_eq!(relay.stats().releases, 2);
    Ok(())
}

#[tokio::test]
async fn test_slow_subscriber_lags() -> Result<(), Box<dyn Error>> {
    let relay = common::relay_with_capacity(2);
    let mut subscription = relay.subscribe("job").await?;

    for n in 0..5 {
        relay.publish("job", format!("m{n}")).await?;
    }

    assert_eq!(
        common::next_within(&mut subscription, WAIT).await,
        Some(Err(RelayError::Lagged(3)))
    );
    assert_eq!(
        common::next_within(&mut subscription, WAIT).await,
        Some(Ok("m3".to_string()))
    );
    Ok(())
}

#[tokio::test]
async fn test_close_ends_subscriptions() -> Result<(), Box<dyn Error>> {
    let relay = MemoryRelay::default();
    let mut subscription = relay.subscribe("job").await?;

    relay.close();

    assert_eq!(common::next_within(&mut subscription, WAIT).await, None);
    assert_eq!(
        relay.publish("job", "late".to_string()).await,
        Err(RelayError::Closed)
    );
    assert!(matches!(
        relay.subscribe("job").await,
        Err(RelayError::Closed)
    ));
    Ok(())
}

#[test]
fn test_connect_validates_config() {
    assert!(MemoryRelay::connect(RelayConfig::memory()).is_ok());
    assert!(matches!(
        MemoryRelay::connect(RelayConfig::memory().with_endpoint("redis://relay:6379")),
        Err(RelayError::UnsupportedEndpoint(_))
    ));
    assert!(matches!(
        MemoryRelay::connect(RelayConfig::memory().with_capacity(0)),
        Err(RelayError::InvalidConfig(_))
    ));
}
