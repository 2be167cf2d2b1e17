use crate::{
    domain::{CaptionStore, VoteStore},
    errors::RepoError,
    models::{Caption, CaptionImage, CaptionVote, FeedCaption},
};
use anyhow::Context;
use async_trait::async_trait;
use aws_sdk_dynamodb::{
    error::{ProvideErrorMetadata, SdkError},
    types::AttributeValue,
    Client as DynamoDbClient,
};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tracing::info;
use uuid::Uuid;

/// True when a conditional write lost its condition check — i.e. another
/// writer got there first.
fn is_conditional_check_failure<E>(err: &SdkError<E>) -> bool
where
    E: ProvideErrorMetadata,
{
    matches!(
        err,
        SdkError::ServiceError(service_err)
            if service_err.err().meta().code() == Some("ConditionalCheckFailedException")
    )
}

/// Paginated Scan of a whole table.
async fn scan_all(
    client: &DynamoDbClient,
    table_name: &str,
) -> Result<Vec<HashMap<String, AttributeValue>>, RepoError> {
    let mut items = Vec::new();
    let mut last_evaluated_key: Option<HashMap<String, AttributeValue>> = None;

    loop {
        let mut request_builder = client.scan().table_name(table_name);

        // Apply ExclusiveStartKey if paginating from previous response
        if let Some(lek) = last_evaluated_key {
            request_builder = request_builder.set_exclusive_start_key(Some(lek));
        }

        let resp = request_builder
            .send()
            .await
            .context(format!("DynamoDB: Failed to scan table '{}'", table_name))
            .map_err(RepoError::BackendError)?;

        if let Some(page) = resp.items {
            tracing::debug!(table_name, page_len = page.len(), "DynamoDB scan page");
            items.extend(page);
        }

        last_evaluated_key = resp.last_evaluated_key;
        if last_evaluated_key.is_none() {
            break;
        }
    }

    Ok(items)
}

// --- Vote store ---

#[derive(Debug, Clone)]
pub struct DynamoVoteStore {
    client: DynamoDbClient,
    table_name: String,
}

impl DynamoVoteStore {
    pub fn new(client: DynamoDbClient, table_name: String) -> Self {
        info!(%table_name, "Initializing DynamoVoteStore");
        Self { client, table_name }
    }
}

#[async_trait]
impl VoteStore for DynamoVoteStore {
    /// Single-row lookup on the (caption, user) composite key.
    async fn find_vote(
        &self,
        caption_id: &str,
        profile_id: Uuid,
    ) -> Result<Option<CaptionVote>, RepoError> {
        let resp = self
            .client
            .get_item()
            .table_name(&self.table_name)
            .key("caption_id", AttributeValue::S(caption_id.to_string()))
            .key("profile_id", AttributeValue::S(profile_id.to_string()))
            .send()
            .await
            .context(format!(
                "DynamoDB (table: {}): Failed to get vote (caption: {})",
                self.table_name, caption_id
            ))
            .map_err(RepoError::BackendError)?;

        match resp.item {
            Some(item) => match item_to_vote(&item) {
                Some(vote) => Ok(Some(vote)),
                None => {
                    tracing::error!(caption_id, table_name = %self.table_name, "DynamoDB: Retrieved item but failed to parse into CaptionVote");
                    Err(RepoError::DataCorruption(format!(
                        "Failed to parse vote row from table '{}' for caption {}",
                        self.table_name, caption_id
                    )))
                }
            },
            None => Ok(None), // No vote yet is not an error
        }
    }

    /// Insert-if-absent. The condition keys on the partition attribute, which
    /// only exists when the item does, so a concurrent insert loses here
    /// instead of writing a second row.
    async fn insert_vote(&self, vote: &CaptionVote) -> Result<(), RepoError> {
        let result = self
            .client
            .put_item()
            .table_name(&self.table_name)
            .item("caption_id", AttributeValue::S(vote.caption_id.clone()))
            .item("profile_id", AttributeValue::S(vote.profile_id.to_string()))
            .item("vote_value", AttributeValue::N(vote.vote_value.to_string()))
            .item(
                "created_datetime_utc",
                AttributeValue::S(vote.created_at.to_rfc3339()),
            )
            .item(
                "modified_datetime_utc",
                AttributeValue::S(vote.modified_at.to_rfc3339()),
            )
            .condition_expression("attribute_not_exists(caption_id)")
            .send()
            .await;

        result.map(|_| ()).map_err(|e| {
            if is_conditional_check_failure(&e) {
                tracing::warn!(caption_id = %vote.caption_id, "vote insert lost a race");
                RepoError::Conflict(vote.caption_id.clone())
            } else {
                RepoError::BackendError(anyhow::Error::new(e).context(format!(
                    "DynamoDB (table: {}): Failed to insert vote (caption: {})",
                    self.table_name, vote.caption_id
                )))
            }
        })
    }

    async fn update_vote(
        &self,
        caption_id: &str,
        profile_id: Uuid,
        expected_value: i8,
        new_value: i8,
        modified_at: DateTime<Utc>,
    ) -> Result<(), RepoError> {
        let result = self
            .client
            .update_item()
            .table_name(&self.table_name)
            .key("caption_id", AttributeValue::S(caption_id.to_string()))
            .key("profile_id", AttributeValue::S(profile_id.to_string()))
            .update_expression(
                "SET vote_value = :new_value, modified_datetime_utc = :modified_at",
            )
            .condition_expression("vote_value = :expected")
            .expression_attribute_values(":new_value", AttributeValue::N(new_value.to_string()))
            .expression_attribute_values(
                ":modified_at",
                AttributeValue::S(modified_at.to_rfc3339()),
            )
            .expression_attribute_values(":expected", AttributeValue::N(expected_value.to_string()))
            .send()
            .await;

        result.map(|_| ()).map_err(|e| {
            if is_conditional_check_failure(&e) {
                tracing::warn!(caption_id, "vote update lost a race");
                RepoError::Conflict(caption_id.to_string())
            } else {
                RepoError::BackendError(anyhow::Error::new(e).context(format!(
                    "DynamoDB (table: {}): Failed to update vote (caption: {})",
                    self.table_name, caption_id
                )))
            }
        })
    }

    async fn delete_vote(
        &self,
        caption_id: &str,
        profile_id: Uuid,
        expected_value: i8,
    ) -> Result<(), RepoError> {
        let result = self
            .client
            .delete_item()
            .table_name(&self.table_name)
            .key("caption_id", AttributeValue::S(caption_id.to_string()))
            .key("profile_id", AttributeValue::S(profile_id.to_string()))
            .condition_expression("vote_value = :expected")
            .expression_attribute_values(":expected", AttributeValue::N(expected_value.to_string()))
            .send()
            .await;

        result.map(|_| ()).map_err(|e| {
            if is_conditional_check_failure(&e) {
                tracing::warn!(caption_id, "vote delete lost a race");
                RepoError::Conflict(caption_id.to_string())
            } else {
                RepoError::BackendError(anyhow::Error::new(e).context(format!(
                    "DynamoDB (table: {}): Failed to delete vote (caption: {})",
                    self.table_name, caption_id
                )))
            }
        })
    }
}

// --- Caption/image read surface ---

#[derive(Debug, Clone)]
pub struct DynamoCaptionStore {
    client: DynamoDbClient,
    captions_table: String,
    images_table: String,
}

impl DynamoCaptionStore {
    pub fn new(client: DynamoDbClient, captions_table: String, images_table: String) -> Self {
        info!(%captions_table, %images_table, "Initializing DynamoCaptionStore");
        Self {
            client,
            captions_table,
            images_table,
        }
    }
}

#[async_trait]
impl CaptionStore for DynamoCaptionStore {
    /// Scans both tables and joins in memory: captions keep their image when
    /// one exists with an http(s) URL, sorted by like_count descending,
    /// capped at `limit`.
    async fn feed_candidates(&self, limit: usize) -> Result<Vec<FeedCaption>, RepoError> {
        let image_items = scan_all(&self.client, &self.images_table).await?;
        let mut images: HashMap<String, String> = HashMap::with_capacity(image_items.len());
        for item in image_items {
            match item_to_image(&item) {
                Some(image) => {
                    images.insert(image.image_id, image.url);
                }
                None => {
                    let item_id = item.get("image_id").and_then(|v| v.as_s().ok());
                    tracing::error!(item.id = ?item_id, table_name = %self.images_table, "DynamoDB: Failed to parse image item from scan");
                    return Err(RepoError::DataCorruption(format!(
                        "Failed to parse image item {:?} during scan of table '{}'",
                        item_id, self.images_table
                    )));
                }
            }
        }

        let caption_items = scan_all(&self.client, &self.captions_table).await?;
        let mut captions: Vec<Caption> = Vec::with_capacity(caption_items.len());
        for item in caption_items {
            match item_to_caption(&item) {
                Some(caption) => captions.push(caption),
                None => {
                    let item_id = item.get("caption_id").and_then(|v| v.as_s().ok());
                    tracing::error!(item.id = ?item_id, table_name = %self.captions_table, "DynamoDB: Failed to parse caption item from scan");
                    // Fail fast if data in the table is corrupt
                    return Err(RepoError::DataCorruption(format!(
                        "Failed to parse caption item {:?} during scan of table '{}'",
                        item_id, self.captions_table
                    )));
                }
            }
        }

        let candidates = join_candidates(captions, &images, limit);
        tracing::info!(
            candidates = candidates.len(),
            "DynamoDB: assembled feed candidates"
        );
        Ok(candidates)
    }
}

/// Inner join of captions to image URLs: captions without a live image
/// reference or without an http(s) URL drop out, the rest sort by
/// popularity descending and truncate to `limit`.
fn join_candidates(
    captions: Vec<Caption>,
    images: &HashMap<String, String>,
    limit: usize,
) -> Vec<FeedCaption> {
    let mut candidates: Vec<FeedCaption> = captions
        .into_iter()
        .filter_map(|caption| {
            let image_id = caption.image_id.clone()?;
            let url = images.get(&image_id)?;
            if !url.starts_with("http") {
                return None;
            }
            Some(FeedCaption {
                caption_id: caption.caption_id,
                content: caption.content,
                like_count: caption.like_count,
                image: CaptionImage {
                    image_id,
                    url: url.clone(),
                },
            })
        })
        .collect();

    candidates.sort_by(|a, b| b.like_count.cmp(&a.like_count));
    candidates.truncate(limit);
    candidates
}

// Helper functions to convert DynamoDB item maps to models.
// Remain internal to this module.

fn item_to_vote(item: &HashMap<String, AttributeValue>) -> Option<CaptionVote> {
    let caption_id = item.get("caption_id")?.as_s().ok()?.to_string();
    let profile_id = item
        .get("profile_id")?
        .as_s()
        .ok()
        .and_then(|s| Uuid::parse_str(s).ok())?;
    let vote_value = item.get("vote_value")?.as_n().ok()?.parse().ok()?;
    let created_at = parse_datetime(item.get("created_datetime_utc")?)?;
    let modified_at = parse_datetime(item.get("modified_datetime_utc")?)?;

    Some(CaptionVote {
        caption_id,
        profile_id,
        vote_value,
        created_at,
        modified_at,
    })
}

fn item_to_caption(item: &HashMap<String, AttributeValue>) -> Option<Caption> {
    let caption_id = item.get("caption_id")?.as_s().ok()?.to_string();
    let content = item.get("content")?.as_s().ok()?.to_string();
    let like_count = item.get("like_count")?.as_n().ok()?.parse().ok()?;
    // The image reference is optional; a caption without one just never
    // reaches the feed.
    let image_id = item
        .get("image_id")
        .and_then(|v| v.as_s().ok())
        .map(|s| s.to_string());

    Some(Caption {
        caption_id,
        content,
        like_count,
        image_id,
    })
}

fn item_to_image(item: &HashMap<String, AttributeValue>) -> Option<CaptionImage> {
    let image_id = item.get("image_id")?.as_s().ok()?.to_string();
    let url = item.get("url")?.as_s().ok()?.to_string();
    Some(CaptionImage { image_id, url })
}

fn parse_datetime(value: &AttributeValue) -> Option<DateTime<Utc>> {
    let s = value.as_s().ok()?;
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caption(id: &str, like_count: i64, image_id: Option<&str>) -> Caption {
        Caption {
            caption_id: id.to_string(),
            content: format!("content for {id}"),
            like_count,
            image_id: image_id.map(String::from),
        }
    }

    #[test]
    fn join_drops_captions_without_a_usable_image() {
        let captions = vec![
            caption("a", 5, Some("img-a")),
            caption("b", 4, None),               // no image reference
            caption("c", 3, Some("img-gone")),   // dangling reference
            caption("d", 2, Some("img-d")),      // non-http URL
        ];
        let images = HashMap::from([
            ("img-a".to_string(), "https://cdn.example/a.png".to_string()),
            ("img-d".to_string(), "file:///tmp/d.png".to_string()),
        ]);

        let joined = join_candidates(captions, &images, 100);

        let ids: Vec<&str> = joined.iter().map(|c| c.caption_id.as_str()).collect();
        assert_eq!(ids, vec!["a"]);
    }

    #[test]
    fn join_orders_by_popularity_and_truncates() {
        let captions = vec![
            caption("low", 1, Some("img")),
            caption("high", 9, Some("img")),
            caption("mid", 5, Some("img")),
        ];
        let images = HashMap::from([(
            "img".to_string(),
            "https://cdn.example/shared.png".to_string(),
        )]);

        let joined = join_candidates(captions, &images, 2);

        let ids: Vec<&str> = joined.iter().map(|c| c.caption_id.as_str()).collect();
        assert_eq!(ids, vec!["high", "mid"]);
    }

    #[test]
    fn vote_item_round_trips_through_the_parser() {
        let profile_id = Uuid::new_v4();
        let item = HashMap::from([
            ("caption_id".to_string(), AttributeValue::S("cap-1".into())),
            (
                "profile_id".to_string(),
                AttributeValue::S(profile_id.to_string()),
            ),
            ("vote_value".to_string(), AttributeValue::N("-1".into())),
            (
                "created_datetime_utc".to_string(),
                AttributeValue::S("2025-03-01T12:00:00+00:00".into()),
            ),
            (
                "modified_datetime_utc".to_string(),
                AttributeValue::S("2025-03-02T08:30:00+00:00".into()),
            ),
        ]);

        let vote = item_to_vote(&item).unwrap();
        assert_eq!(vote.caption_id, "cap-1");
        assert_eq!(vote.profile_id, profile_id);
        assert_eq!(vote.vote_value, -1);
        assert_eq!(vote.modified_at.to_rfc3339(), "2025-03-02T08:30:00+00:00");
    }

    #[test]
    fn malformed_vote_item_parses_to_none() {
        let item = HashMap::from([
            ("caption_id".to_string(), AttributeValue::S("cap-1".into())),
            (
                "profile_id".to_string(),
                AttributeValue::S("not-a-uuid".into()),
            ),
            ("vote_value".to_string(), AttributeValue::N("1".into())),
        ]);

        assert!(item_to_vote(&item).is_none());
    }

    #[test]
    fn caption_item_tolerates_a_missing_image_reference() {
        let item = HashMap::from([
            ("caption_id".to_string(), AttributeValue::S("cap-1".into())),
            ("content".to_string(), AttributeValue::S("some joke".into())),
            ("like_count".to_string(), AttributeValue::N("7".into())),
        ]);

        let caption = item_to_caption(&item).unwrap();
        assert_eq!(caption.like_count, 7);
        assert_eq!(caption.image_id, None);
    }
}
