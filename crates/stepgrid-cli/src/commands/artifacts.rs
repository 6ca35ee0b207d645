use stepgrid_control::{ArtifactObject, ArtifactStore};
use stepgrid_core::ArtifactUri;

use super::Context;

/// Split an `s3://bucket[/prefix]` location into bucket and key prefix.
pub fn bucket_and_prefix(location: &str) -> anyhow::Result<(String, String)> {
    match ArtifactUri::parse(location)? {
        ArtifactUri::S3 { bucket, key } => Ok((bucket, key)),
        other => anyhow::bail!(
            "artifact listing needs an s3:// location, got a {} location",
            other.scheme()
        ),
    }
}

pub async fn list(ctx: &Context, location: &str) -> anyhow::Result<()> {
    let (bucket, prefix) = bucket_and_prefix(location)?;
    let objects = ctx.plane()?.list_artifacts(&bucket, &prefix).await?;
    ctx.emit(&objects, || format_listing(&bucket, &objects))
}

fn format_listing(bucket: &str, objects: &[ArtifactObject]) -> String {
    if objects.is_empty() {
        return format!("No files found in {bucket}.\n");
    }
    let mut out = String::new();
    for o in objects {
        match o.size_bytes {
            Some(size) => out.push_str(&format!("s3://{bucket}/{}  ({size} bytes)\n", o.key)),
            None => out.push_str(&format!("s3://{bucket}/{}\n", o.key)),
        }
    }
    out
}
