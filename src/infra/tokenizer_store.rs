// ============================================================
// Layer 6 — Tokenizer Store
// ============================================================
// Builds, saves and loads the word-level tokenizer shared by the
// query and document encoders.
//
// In tokenizers 0.15, train_from_files requires Trainer::Model
// to equal ModelWrapper. The vocabulary is therefore counted by
// hand and written as HuggingFace tokenizer JSON, which is then
// parsed back into a Tokenizer.
//
// Reserved ids (stable across builds):
//   0 [PAD]   1 [UNK]   2 [CLS]   3 [SEP]   4 [Q]   5 [D]
// Corpus words start at id 6, most frequent first.

use std::collections::HashMap;
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{Context, Result};
use tokenizers::Tokenizer;

pub const PAD_ID: u32 = 0;
pub const UNK_ID: u32 = 1;
pub const CLS_ID: u32 = 2;
pub const SEP_ID: u32 = 3;
pub const QUERY_MARKER_ID: u32 = 4;
pub const DOC_MARKER_ID: u32 = 5;

const SPECIAL_TOKENS: [(&str, u32); 6] = [
    ("[PAD]", PAD_ID),
    ("[UNK]", UNK_ID),
    ("[CLS]", CLS_ID),
    ("[SEP]", SEP_ID),
    ("[Q]", QUERY_MARKER_ID),
    ("[D]", DOC_MARKER_ID),
];

const TOKENIZER_FILE: &str = "tokenizer.json";

/// Word-level tokenizer JSON for `texts`, capped at `vocab_size` entries
/// including the special tokens.
pub fn word_level_json(texts: &[String], vocab_size: usize) -> serde_json::Value {
    // ── Step 1: word frequencies ──────────────────────────────────────────────
    let mut freq: HashMap<String, usize> = HashMap::new();
    for text in texts {
        for word in text.split_whitespace() {
            let w = word.to_lowercase();
            let w = w.trim_matches(|c: char| !c.is_alphanumeric());
            if !w.is_empty() {
                *freq.entry(w.to_string()).or_insert(0) += 1;
            }
        }
    }

    // Most frequent first, ties alphabetical so rebuilds are stable
    let mut words: Vec<(String, usize)> = freq.into_iter().collect();
    words.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    words.truncate(vocab_size.saturating_sub(SPECIAL_TOKENS.len()));

    // ── Step 2: vocabulary ────────────────────────────────────────────────────
    let mut vocab = serde_json::Map::new();
    for (token, id) in SPECIAL_TOKENS {
        vocab.insert(token.to_string(), serde_json::json!(id));
    }
    let mut next_id = SPECIAL_TOKENS.len();
    for (word, _) in words {
        if !vocab.contains_key(&word) {
            vocab.insert(word, serde_json::json!(next_id));
            next_id += 1;
        }
    }

    let added_tokens: Vec<serde_json::Value> = SPECIAL_TOKENS
        .iter()
        .map(|(content, id)| {
            serde_json::json!({
                "id": id, "content": content, "single_word": false, "lstrip": false,
                "rstrip": false, "normalized": false, "special": true
            })
        })
        .collect();

    // ── Step 3: HuggingFace layout ────────────────────────────────────────────
    serde_json::json!({
        "version": "1.0",
        "truncation": null,
        "padding": null,
        "added_tokens": added_tokens,
        "normalizer": {
            "type": "BertNormalizer",
            "clean_text": true,
            "handle_chinese_chars": true,
            "strip_accents": null,
            "lowercase": true
        },
        "pre_tokenizer": { "type": "Whitespace" },
        "post_processor": null,
        "decoder": null,
        "model": {
            "type": "WordLevel",
            "vocab": vocab,
            "unk_token": "[UNK]"
        }
    })
}

/// Build an in-memory word-level tokenizer from `texts`.
pub fn build_word_level(texts: &[String], vocab_size: usize) -> Result<Tokenizer> {
    let json = word_level_json(texts, vocab_size);
    Tokenizer::from_str(&json.to_string())
        .map_err(|e| anyhow::anyhow!("Cannot build word-level tokenizer: {e}"))
}

pub struct TokenizerStore {
    dir: PathBuf,
}

impl TokenizerStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join(TOKENIZER_FILE)
    }

    /// Load the saved tokenizer or build one from `texts` and save it.
    pub fn load_or_build(&self, texts: &[String], vocab_size: usize) -> Result<Tokenizer> {
        if self.path().exists() {
            tracing::info!("Loading existing tokenizer from '{}'", self.path().display());
            self.load()
        } else {
            tracing::info!("Building new tokenizer (vocab_size={})", vocab_size);
            self.build_and_save(texts, vocab_size)
        }
    }

    /// Load a previously saved tokenizer.
    pub fn load(&self) -> Result<Tokenizer> {
        let path = self.path();
        Tokenizer::from_file(&path)
            .map_err(|e| anyhow::anyhow!("Cannot load tokenizer from '{}': {}", path.display(), e))
    }

    fn build_and_save(&self, texts: &[String], vocab_size: usize) -> Result<Tokenizer> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("Cannot create '{}'", self.dir.display()))?;

        let json = word_level_json(texts, vocab_size);
        let path = self.path();
        std::fs::write(&path, serde_json::to_string_pretty(&json)?)
            .with_context(|| format!("Cannot write tokenizer JSON to '{}'", path.display()))?;

        let tokenizer = self.load()?;
        tracing::info!(
            "Tokenizer built with {} entries, saved to '{}'",
            tokenizer.get_vocab_size(true),
            path.display()
        );
        Ok(tokenizer)
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn texts() -> Vec<String> {
        vec![
            "Rust is fast.".to_string(),
            "rust is safe and rust is fun".to_string(),
        ]
    }

    #[test]
    fn test_special_tokens_have_fixed_ids() {
        let tokenizer = build_word_level(&texts(), 100).unwrap();
        assert_eq!(tokenizer.token_to_id("[PAD]"), Some(PAD_ID));
        assert_eq!(tokenizer.token_to_id("[CLS]"), Some(CLS_ID));
        assert_eq!(tokenizer.token_to_id("[Q]"), Some(QUERY_MARKER_ID));
        assert_eq!(tokenizer.token_to_id("[D]"), Some(DOC_MARKER_ID));
        // most frequent words take the first free ids, ties alphabetical
        assert_eq!(tokenizer.token_to_id("is"), Some(6));
        assert_eq!(tokenizer.token_to_id("rust"), Some(7));
    }

    #[test]
    fn test_unknown_words_map_to_unk() {
        let tokenizer = build_word_level(&texts(), 100).unwrap();
        let encoding = tokenizer.encode("rust zebra", false).unwrap();
        assert_eq!(encoding.get_ids(), &[7, UNK_ID]);
    }

    #[test]
    fn test_vocab_size_caps_words() {
        let tokenizer = build_word_level(&texts(), 8).unwrap();
        assert_eq!(tokenizer.get_vocab_size(true), 8);
    }

    #[test]
    fn test_store_builds_once_then_loads() {
        let dir = TempDir::new().unwrap();
        let store = TokenizerStore::new(dir.path());
        let built = store.load_or_build(&texts(), 100).unwrap();
        assert!(store.path().exists());

        let loaded = store.load_or_build(&[], 100).unwrap();
        assert_eq!(built.get_vocab(true), loaded.get_vocab(true));
    }
}
