use std::iter::repeat;
use std::path::{Path, PathBuf};

use url::Url;

pub fn find_first_subpath<P: AsRef<Path>, F: Fn(&Path) -> bool>(
    root: impl AsRef<Path>,
    subpaths: &[P],
    search: F,
) -> Option<PathBuf> {
    subpaths
        .iter()
        .zip(repeat(root.as_ref()))
        .map(|(b, a)| a.join(b))
        .find(|it: &PathBuf| search(it))
}

/// Accepts only absolute `http`/`https` URLs with a host part.
pub fn is_web_url(url: &str) -> bool {
    match Url::parse(url) {
        Ok(parsed) => {
            matches!(parsed.scheme(), "http" | "https")
                && parsed.host_str().map_or(false, |host| !host.is_empty())
        }
        Err(_) => false,
    }
}

/// Stores a list of UUIDs as BSON binary subtype 4 values, matching
/// `bson::serde_helpers::uuid_1_as_binary` used for single ids.
pub mod uuid_vec_as_binary {
    use serde::ser::SerializeSeq;
    use serde::{Deserialize, Deserializer, Serializer};
    use uuid::Uuid;

    pub fn serialize<S>(ids: &[Uuid], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut seq = serializer.serialize_seq(Some(ids.len()))?;
        for id in ids {
            seq.serialize_element(&bson::Uuid::from_bytes(id.into_bytes()))?;
        }
        seq.end()
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<Uuid>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let ids = Vec::<bson::Uuid>::deserialize(deserializer)?;
        Ok(ids
            .into_iter()
            .map(|id| Uuid::from_bytes(id.bytes()))
            .collect())
    }
}

/// Adds `item` if it isn't present yet. Returns whether the list changed.
pub fn insert_unique<T: PartialEq>(list: &mut Vec<T>, item: T) -> bool {
    if list.contains(&item) {
        false
    } else {
        list.push(item);
        true
    }
}

/// Removes every occurrence of `item`. Returns whether the list changed.
pub fn remove_all<T: PartialEq>(list: &mut Vec<T>, item: &T) -> bool {
    let before = list.len();
    list.retain(|it| it != item);
    before != list.len()
}
