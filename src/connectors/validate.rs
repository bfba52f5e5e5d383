//! Input validators for descriptors and remote identifiers.
//!
//! Every validator returns the input unchanged on success so it can be used
//! inline: `let bucket = validate_bucket(name)?;`.

use crate::Result;
use crate::ValidationError;

const REGION_AREAS: [&str; 9] = ["af", "ap", "ca", "cn", "eu", "me", "sa", "us", "us-gov"];
const REGION_DIRECTIONS: [&str; 9] = [
    "central",
    "east",
    "north",
    "northeast",
    "northwest",
    "south",
    "southeast",
    "southwest",
    "west",
];

/// Remote function names: 1 to 64 ASCII letters, digits or `-`
pub fn validate_target_name(name: &str) -> Result<&str> {
    let valid = (1..=64).contains(&name.len())
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-');
    if !valid {
        return Err(ValidationError::InvalidTargetName(name.to_string()).into());
    }
    Ok(name)
}

/// Bucket names: 3 to 63 chars of dot-separated labels made of lowercase
/// letters, digits and inner `-`, and not shaped like an IP address
pub fn validate_bucket(bucket: &str) -> Result<&str> {
    if !is_valid_bucket(bucket) {
        return Err(ValidationError::InvalidBucket(bucket.to_string()).into());
    }
    Ok(bucket)
}

fn is_valid_bucket(bucket: &str) -> bool {
    if !(3..=63).contains(&bucket.len()) {
        return false;
    }

    let looks_like_ip =
        bucket.contains('.') && bucket.split('.').all(|l| !l.is_empty() && l.chars().all(|c| c.is_ascii_digit()));
    if looks_like_ip {
        return false;
    }

    bucket.split('.').all(|label| {
        let bytes = label.as_bytes();
        let edge_ok = |b: u8| b.is_ascii_lowercase() || b.is_ascii_digit();
        match (bytes.first(), bytes.last()) {
            (Some(&first), Some(&last)) => {
                edge_ok(first)
                    && edge_ok(last)
                    && bytes.iter().all(|&b| edge_ok(b) || b == b'-')
            }
            _ => false,
        }
    })
}

/// Regions shaped like `<area>-<direction>-<digit>`, e.g. `us-east-1`
pub fn validate_region(region: &str) -> Result<&str> {
    if !is_valid_region(region) {
        return Err(ValidationError::InvalidRegion(region.to_string()).into());
    }
    Ok(region)
}

fn is_valid_region(region: &str) -> bool {
    let Some((rest, digit)) = region.rsplit_once('-') else {
        return false;
    };
    if digit.len() != 1 || !digit.chars().all(|c| c.is_ascii_digit()) {
        return false;
    }

    REGION_AREAS.iter().any(|area| {
        rest.strip_prefix(area)
            .and_then(|r| r.strip_prefix('-'))
            .is_some_and(|direction| REGION_DIRECTIONS.contains(&direction))
    })
}

/// Transcoding pipeline ids: 13 digits, `-`, 6 lowercase letters
pub fn validate_pipeline_id(id: &str) -> Result<&str> {
    let valid = match id.split_once('-') {
        Some((digits, letters)) => {
            digits.len() == 13
                && digits.chars().all(|c| c.is_ascii_digit())
                && letters.len() == 6
                && letters.chars().all(|c| c.is_ascii_lowercase())
        }
        None => false,
    };
    if !valid {
        return Err(ValidationError::InvalidPipelineId(id.to_string()).into());
    }
    Ok(id)
}

/// Object URLs of the form `s3://<bucket>/<key>` where the key has no empty
/// path segment
pub fn validate_object_url(url: &str) -> Result<&str> {
    let invalid = || ValidationError::InvalidObjectUrl(url.to_string());

    let rest = url.strip_prefix("s3://").ok_or_else(invalid)?;
    let (bucket, key) = rest.split_once('/').ok_or_else(invalid)?;
    if !is_valid_bucket(bucket) || key.is_empty() || key.split('/').any(str::is_empty) {
        return Err(invalid().into());
    }
    Ok(url)
}

/// `s3://<bucket>/<key>` for a validated bucket
pub fn object_url(
    bucket: &str,
    key: &str,
) -> Result<String> {
    validate_bucket(bucket)?;
    Ok(format!("s3://{bucket}/{key}"))
}
