//! Drives one provider's listings through a compiled scope plan into the
//! ingest writer, converting provider errors into classified events as it
//! goes. This is the thin shell the ingest writer and scope planner expect
//! to sit behind a real crawler; here it runs over the bundled local
//! filesystem provider.

use anyhow::Result;
use coldindex_core::domain::{CrawlOutcome, ErrorEvent, ObjectSighting, PrefixSighting, ProviderErrorKind};
use coldindex_core::provider::Listing;
use coldindex_core::{IngestWriter, ScopePlan};

pub async fn run_crawl(
    provider: &dyn Listing,
    writer: &IngestWriter,
    plan: &ScopePlan,
) -> Result<CrawlOutcome> {
    for prefix in &plan.prefixes {
        let mut continuation: Option<String> = None;
        let mut objects_direct = 0u64;
        let mut bytes_direct = 0u64;

        loop {
            let page = match provider.list(prefix, continuation.as_deref()).await {
                Ok(page) => page,
                Err(err) => {
                    let kind = ProviderErrorKind::classify(err.as_ref());
                    writer
                        .write_error(ErrorEvent {
                            kind,
                            detail: Some(err.to_string()),
                            key: None,
                            prefix: Some(prefix.clone()),
                        })
                        .await?;
                    break;
                }
            };

            for obj in page.objects {
                objects_direct += 1;
                bytes_direct += obj.size;
                writer
                    .write_object(ObjectSighting {
                        key: obj.key,
                        size_bytes: obj.size,
                        etag: obj.etag,
                        last_modified: obj.last_modified,
                    })
                    .await?;
            }

            if page.is_truncated {
                continuation = page.continuation_token;
                if continuation.is_none() {
                    break;
                }
            } else {
                break;
            }
        }

        writer
            .write_prefix(PrefixSighting {
                prefix: prefix.clone(),
                depth: prefix.matches('/').count() as u32,
                objects_direct,
                bytes_direct,
                common_prefixes: 0,
                truncated: false,
                truncated_reason: None,
            })
            .await?;
    }

    Ok(CrawlOutcome::Completed)
}
