use crate::errors::AppError;
use aws_sdk_dynamodb::{
    error::SdkError as DynamoSdkError,
    types::{AttributeDefinition, BillingMode, KeySchemaElement, KeyType, ScalarAttributeType},
    Client as DynamoDbClient,
};

pub const CAPTIONS_TABLE: &str = "captions";
pub const IMAGES_TABLE: &str = "images";
pub const VOTES_TABLE: &str = "caption_votes";

/// Creates a DynamoDB table if it doesn't exist. A sort key, when given,
/// becomes the range half of a composite primary key.
async fn create_table_if_not_exists(
    client: &DynamoDbClient,
    table_name: &str,
    partition_key: &str,
    sort_key: Option<&str>,
) -> Result<(), AppError> {
    let mut attribute_definitions = vec![
        AttributeDefinition::builder()
            .attribute_name(partition_key)
            .attribute_type(ScalarAttributeType::S)
            .build()
            .map_err(|e| AppError::InitError(format!("Failed to build attribute definition: {}", e)))?,
    ];
    let mut key_schema = vec![
        KeySchemaElement::builder()
            .attribute_name(partition_key)
            .key_type(KeyType::Hash)
            .build()
            .map_err(|e| AppError::InitError(format!("Failed to build key schema: {}", e)))?,
    ];

    if let Some(sort_key) = sort_key {
        attribute_definitions.push(
            AttributeDefinition::builder()
                .attribute_name(sort_key)
                .attribute_type(ScalarAttributeType::S)
                .build()
                .map_err(|e| AppError::InitError(format!("Failed to build attribute definition: {}", e)))?,
        );
        key_schema.push(
            KeySchemaElement::builder()
                .attribute_name(sort_key)
                .key_type(KeyType::Range)
                .build()
                .map_err(|e| AppError::InitError(format!("Failed to build key schema: {}", e)))?,
        );
    }

    let result = client
        .create_table()
        .table_name(table_name)
        .set_attribute_definitions(Some(attribute_definitions))
        .set_key_schema(Some(key_schema))
        .billing_mode(BillingMode::PayPerRequest)
        .send()
        .await;

    match result {
        Ok(_) => {
            tracing::info!("Startup: Table '{}' created successfully or setup initiated.", table_name);
            Ok(())
        }
        Err(e) => {
            if let DynamoSdkError::ServiceError(service_err) = &e {
                if service_err.err().is_resource_in_use_exception() {
                    tracing::info!("Startup: Table '{}' already exists, no action needed.", table_name);
                    Ok(())
                } else {
                    let context = format!("Startup: Service error creating DynamoDB table '{}'", table_name);
                    tracing::error!("{}: {:?}", context, service_err);
                    Err(AppError::InitError(format!("{}: {}", context, e)))
                }
            } else {
                let context = format!("Startup: SDK error creating DynamoDB table '{}'", table_name);
                tracing::error!("{}: {}", context, e);
                Err(AppError::InitError(format!("{}: {}", context, e)))
            }
        }
    }
}

/// Initializes required DynamoDB tables. The vote table's composite key
/// (caption_id, profile_id) is the unique-(caption, user) constraint.
pub async fn init_resources(client: &DynamoDbClient) -> Result<(), AppError> {
    tracing::info!("Startup: Initializing DynamoDB tables...");
    create_table_if_not_exists(client, IMAGES_TABLE, "image_id", None).await?;
    create_table_if_not_exists(client, CAPTIONS_TABLE, "caption_id", None).await?;
    create_table_if_not_exists(client, VOTES_TABLE, "caption_id", Some("profile_id")).await?;
    tracing::info!("Startup: DynamoDB table initialization complete.");
    Ok(())
}
