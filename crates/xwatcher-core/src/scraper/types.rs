//! Upstream wire types and normalisation into canonical tweet records.
//!
//! The provider speaks camelCase JSON with nested sub-objects for retweets
//! and quotes. Everything here maps that shape onto [`Tweet`] and cleans
//! the text on the way through.

use serde::Deserialize;

use crate::storage::tweets::{MediaItem, Tweet};

/// Hard cap on stored tweet text length, in characters.
const MAX_TEXT_CHARS: usize = 25_000;

/// Referenced texts at or below this length ending in an ellipsis are
/// likely truncated upstream; a warning is logged.
const TRUNCATION_SUSPECT_CHARS: usize = 300;

/// Envelope of the `GET /user/last_tweets` response.
#[derive(Debug, Deserialize)]
pub struct LastTweetsResponse {
    /// Provider status string ("success" / "error").
    #[serde(default)]
    pub status: Option<String>,
    /// Payload.
    #[serde(default)]
    pub data: Option<LastTweetsData>,
}

/// Payload of the last-tweets response.
#[derive(Debug, Default, Deserialize)]
pub struct LastTweetsData {
    /// The fetched tweets, newest first.
    #[serde(default)]
    pub tweets: Vec<UpstreamTweet>,
}

/// One tweet as the provider returns it.
#[derive(Debug, Default, Deserialize)]
pub struct UpstreamTweet {
    /// Tweet id.
    #[serde(default)]
    pub id: String,
    /// Short text (may be truncated for long tweets).
    #[serde(default)]
    pub text: Option<String>,
    /// Full text when the provider expands it.
    #[serde(default, alias = "fullText")]
    pub full_text: Option<String>,
    /// Long-form note tweet content.
    #[serde(default)]
    pub note_tweet: Option<NoteTweet>,
    /// Creation time in Twitter's legacy format or RFC 3339.
    #[serde(default, rename = "createdAt")]
    pub created_at: Option<String>,
    /// Author of the tweet.
    #[serde(default)]
    pub author: Option<UpstreamAuthor>,
    /// Whether this tweet is a reply.
    #[serde(default, rename = "isReply")]
    pub is_reply: bool,
    /// Id of the tweet being replied to.
    #[serde(default, rename = "inReplyToId")]
    pub in_reply_to_id: Option<String>,
    /// Embedded original when this is a retweet.
    #[serde(default)]
    pub retweeted_tweet: Option<Box<UpstreamTweet>>,
    /// Embedded original when this is a quote tweet.
    #[serde(default)]
    pub quoted_tweet: Option<Box<UpstreamTweet>>,
    /// Media attachments.
    #[serde(default, rename = "extendedEntities")]
    pub extended_entities: Option<ExtendedEntities>,
}

/// Long-form tweet body.
#[derive(Debug, Deserialize)]
pub struct NoteTweet {
    /// The full note text.
    #[serde(default)]
    pub text: String,
}

/// Tweet author sub-object.
#[derive(Debug, Deserialize)]
pub struct UpstreamAuthor {
    /// @handle.
    #[serde(default, rename = "userName")]
    pub user_name: String,
    /// Display name.
    #[serde(default)]
    pub name: String,
}

/// Media container.
#[derive(Debug, Default, Deserialize)]
pub struct ExtendedEntities {
    /// Ordered media attachments.
    #[serde(default)]
    pub media: Vec<UpstreamMedia>,
}

/// One media attachment.
#[derive(Debug, Deserialize)]
pub struct UpstreamMedia {
    /// Provider media key.
    #[serde(default, rename = "media_key")]
    pub media_key: String,
    /// Media kind.
    #[serde(default, rename = "type")]
    pub media_type: String,
    /// Direct URL.
    #[serde(default, alias = "media_url_https")]
    pub url: String,
    /// Pixel width.
    #[serde(default)]
    pub width: Option<i64>,
    /// Pixel height.
    #[serde(default)]
    pub height: Option<i64>,
}

/// Collapse CR/LF into spaces, squeeze whitespace runs, and cap the length.
pub fn clean_text(raw: &str) -> String {
    let collapsed: String = raw
        .split_whitespace()
        .collect::<Vec<&str>>()
        .join(" ");
    collapsed.chars().take(MAX_TEXT_CHARS).collect()
}

/// Choose the longest of the candidate text fields.
///
/// Preference is resolved by length, so an expanded `note_tweet` body wins
/// over the truncated short text.
fn best_text(tweet: &UpstreamTweet) -> String {
    let mut candidates: Vec<&str> = Vec::new();
    if let Some(note) = &tweet.note_tweet {
        candidates.push(&note.text);
    }
    if let Some(full) = &tweet.full_text {
        candidates.push(full);
    }
    if let Some(text) = &tweet.text {
        candidates.push(text);
    }

    candidates
        .into_iter()
        .max_by_key(|t| t.chars().count())
        .unwrap_or_default()
        .to_string()
}

/// Parse the provider's creation timestamp into RFC 3339 UTC.
///
/// Accepts Twitter's legacy `"Tue Dec 10 07:00:30 +0000 2024"` format and
/// plain RFC 3339. Returns `None` for anything else.
pub fn parse_created_at(raw: &str) -> Option<String> {
    if let Ok(dt) = chrono::DateTime::parse_from_str(raw, "%a %b %d %H:%M:%S %z %Y") {
        return Some(
            dt.with_timezone(&chrono::Utc)
                .to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
        );
    }
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(raw) {
        return Some(
            dt.with_timezone(&chrono::Utc)
                .to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
        );
    }
    None
}

fn convert_media(entities: Option<&ExtendedEntities>) -> Vec<MediaItem> {
    entities
        .map(|e| {
            e.media
                .iter()
                .map(|m| MediaItem {
                    key: m.media_key.clone(),
                    media_type: m.media_type.clone(),
                    url: m.url.clone(),
                    width: m.width,
                    height: m.height,
                })
                .collect()
        })
        .unwrap_or_default()
}

impl UpstreamTweet {
    /// Normalise into a canonical [`Tweet`].
    ///
    /// Returns `None` when required fields are missing: no id, no author
    /// handle, empty text after cleaning, or an unparseable timestamp.
    pub fn into_canonical(self) -> Option<Tweet> {
        if self.id.is_empty() {
            return None;
        }

        let author = self.author.as_ref()?;
        if author.user_name.is_empty() {
            return None;
        }

        let text = clean_text(&best_text(&self));
        if text.is_empty() {
            return None;
        }

        let created_at = parse_created_at(self.created_at.as_deref()?)?;

        // Reference extraction: retweet wins over quote, which wins over reply.
        let (reference_type, referenced) = if let Some(rt) = &self.retweeted_tweet {
            (Some("retweeted"), Some(rt.as_ref()))
        } else if let Some(qt) = &self.quoted_tweet {
            (Some("quoted"), Some(qt.as_ref()))
        } else if self.is_reply && self.in_reply_to_id.is_some() {
            (Some("replied_to"), None)
        } else {
            (None, None)
        };

        let (referenced_tweet_id, referenced_tweet_text, referenced_media, referenced_author) =
            match (reference_type, referenced) {
                (Some("replied_to"), None) => (self.in_reply_to_id.clone(), None, Vec::new(), None),
                (Some(_), Some(sub)) => {
                    let sub_text = clean_text(&best_text(sub));
                    if sub_text.chars().count() <= TRUNCATION_SUSPECT_CHARS
                        && (sub_text.ends_with('…') || sub_text.ends_with("..."))
                    {
                        tracing::warn!(
                            tweet_id = %self.id,
                            referenced_id = %sub.id,
                            chars = sub_text.chars().count(),
                            "referenced tweet text looks truncated"
                        );
                    }
                    (
                        if sub.id.is_empty() {
                            None
                        } else {
                            Some(sub.id.clone())
                        },
                        if sub_text.is_empty() {
                            None
                        } else {
                            Some(sub_text)
                        },
                        convert_media(sub.extended_entities.as_ref()),
                        sub.author.as_ref().map(|a| a.user_name.clone()),
                    )
                }
                _ => (None, None, Vec::new(), None),
            };

        let media = convert_media(self.extended_entities.as_ref());

        Some(Tweet {
            tweet_id: self.id,
            text,
            created_at,
            author_username: author.user_name.clone(),
            author_display_name: author.name.clone(),
            referenced_tweet_id,
            reference_type: reference_type.map(str::to_string),
            referenced_tweet_text,
            referenced_tweet_media: referenced_media,
            referenced_tweet_author_username: referenced_author,
            media,
            dedup_group_id: None,
            db_created_at: String::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn author(handle: &str) -> Option<UpstreamAuthor> {
        Some(UpstreamAuthor {
            user_name: handle.to_string(),
            name: format!("{handle} display"),
        })
    }

    fn base_tweet(id: &str, text: &str) -> UpstreamTweet {
        UpstreamTweet {
            id: id.to_string(),
            text: Some(text.to_string()),
            created_at: Some("Tue Dec 10 07:00:30 +0000 2024".to_string()),
            author: author("alice"),
            ..Default::default()
        }
    }

    #[test]
    fn clean_text_collapses_whitespace() {
        assert_eq!(clean_text("a\r\nb   c\td"), "a b c d");
        assert_eq!(clean_text("  trimmed  "), "trimmed");
        assert_eq!(clean_text(""), "");
    }

    #[test]
    fn clean_text_caps_length() {
        let long = "x".repeat(30_000);
        assert_eq!(clean_text(&long).chars().count(), 25_000);
    }

    #[test]
    fn parse_legacy_twitter_timestamp() {
        let parsed = parse_created_at("Tue Dec 10 07:00:30 +0000 2024").unwrap();
        assert_eq!(parsed, "2024-12-10T07:00:30Z");
    }

    #[test]
    fn parse_rfc3339_timestamp() {
        let parsed = parse_created_at("2026-01-02T03:04:05+08:00").unwrap();
        assert_eq!(parsed, "2026-01-01T19:04:05Z");
    }

    #[test]
    fn parse_garbage_timestamp_is_none() {
        assert!(parse_created_at("yesterday").is_none());
    }

    #[test]
    fn canonical_basic_fields() {
        let tweet = base_tweet("t1", "hello world").into_canonical().unwrap();
        assert_eq!(tweet.tweet_id, "t1");
        assert_eq!(tweet.text, "hello world");
        assert_eq!(tweet.author_username, "alice");
        assert_eq!(tweet.created_at, "2024-12-10T07:00:30Z");
        assert!(tweet.reference_type.is_none());
    }

    #[test]
    fn longest_candidate_text_wins() {
        let mut tweet = base_tweet("t1", "short…");
        tweet.note_tweet = Some(NoteTweet {
            text: "this is the much longer note tweet body".to_string(),
        });
        let canonical = tweet.into_canonical().unwrap();
        assert_eq!(canonical.text, "this is the much longer note tweet body");
    }

    #[test]
    fn retweet_wins_over_quote_and_reply() {
        let mut tweet = base_tweet("t1", "RT @bob: original");
        tweet.is_reply = true;
        tweet.in_reply_to_id = Some("r1".to_string());
        tweet.quoted_tweet = Some(Box::new(base_tweet("q1", "quoted")));
        let mut original = base_tweet("orig1", "the original text");
        original.author = author("bob");
        tweet.retweeted_tweet = Some(Box::new(original));

        let canonical = tweet.into_canonical().unwrap();
        assert_eq!(canonical.reference_type.as_deref(), Some("retweeted"));
        assert_eq!(canonical.referenced_tweet_id.as_deref(), Some("orig1"));
        assert_eq!(
            canonical.referenced_tweet_text.as_deref(),
            Some("the original text")
        );
        assert_eq!(
            canonical.referenced_tweet_author_username.as_deref(),
            Some("bob")
        );
    }

    #[test]
    fn reply_reference_uses_in_reply_to_id() {
        let mut tweet = base_tweet("t1", "replying here");
        tweet.is_reply = true;
        tweet.in_reply_to_id = Some("parent1".to_string());

        let canonical = tweet.into_canonical().unwrap();
        assert_eq!(canonical.reference_type.as_deref(), Some("replied_to"));
        assert_eq!(canonical.referenced_tweet_id.as_deref(), Some("parent1"));
        assert!(canonical.referenced_tweet_text.is_none());
    }

    #[test]
    fn media_order_preserved() {
        let mut tweet = base_tweet("t1", "with media");
        tweet.extended_entities = Some(ExtendedEntities {
            media: vec![
                UpstreamMedia {
                    media_key: "m9".to_string(),
                    media_type: "photo".to_string(),
                    url: "https://example.com/9.jpg".to_string(),
                    width: Some(100),
                    height: Some(200),
                },
                UpstreamMedia {
                    media_key: "m1".to_string(),
                    media_type: "video".to_string(),
                    url: "https://example.com/1.mp4".to_string(),
                    width: None,
                    height: None,
                },
            ],
        });

        let canonical = tweet.into_canonical().unwrap();
        assert_eq!(canonical.media.len(), 2);
        assert_eq!(canonical.media[0].key, "m9");
        assert_eq!(canonical.media[1].key, "m1");
    }

    #[test]
    fn missing_required_fields_rejected() {
        // No id.
        let mut no_id = base_tweet("", "text");
        no_id.id = String::new();
        assert!(no_id.into_canonical().is_none());

        // No author.
        let mut no_author = base_tweet("t1", "text");
        no_author.author = None;
        assert!(no_author.into_canonical().is_none());

        // Empty text after cleaning.
        let blank = base_tweet("t1", "   ");
        assert!(blank.into_canonical().is_none());

        // Bad timestamp.
        let mut bad_ts = base_tweet("t1", "text");
        bad_ts.created_at = Some("not a date".to_string());
        assert!(bad_ts.into_canonical().is_none());
    }
}
