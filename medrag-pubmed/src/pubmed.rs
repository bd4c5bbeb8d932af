//! NCBI E-utilities client: `esearch` for identifiers, `efetch` for records.

use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use medrag_rag::{ArticleRecord, RagError, Result, with_retry};
use regex::Regex;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::{debug, error, info};

use crate::config::PubMedConfig;
use crate::source::{ArticleFetcher, LiteratureSearch};

const SERVICE: &str = "pubmed";

static ARTICLE_TITLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<ArticleTitle[^>]*>(.*?)</ArticleTitle>").expect("valid title pattern")
});

static ABSTRACT_TEXT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<AbstractText([^>]*)>(.*?)</AbstractText>").expect("valid abstract pattern")
});

static LABEL_ATTR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"Label="([^"]*)""#).expect("valid label pattern"));

static INLINE_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^>]+>").expect("valid tag pattern"));

static NUMERIC_ENTITY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"&#(x[0-9A-Fa-f]+|[0-9]+);").expect("valid entity pattern"));

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    esearchresult: SearchResult,
}

#[derive(Debug, Default, Deserialize)]
struct SearchResult {
    #[serde(default)]
    idlist: Vec<String>,
}

/// Extract identifiers from an `esearch` JSON body.
pub fn parse_search_response(body: &str) -> Result<Vec<String>> {
    let response: SearchResponse = serde_json::from_str(body).map_err(|e| RagError::UpstreamFetch {
        service: SERVICE.to_string(),
        message: format!("malformed esearch response: {e}"),
    })?;
    Ok(response.esearchresult.idlist)
}

fn decode_entities(text: &str) -> String {
    let decoded = NUMERIC_ENTITY.replace_all(text, |caps: &regex::Captures<'_>| {
        let code = &caps[1];
        let value = match code.strip_prefix('x') {
            Some(hex) => u32::from_str_radix(hex, 16).ok(),
            None => code.parse().ok(),
        };
        value.and_then(char::from_u32).map(String::from).unwrap_or_default()
    });
    decoded
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

fn element_text(inner: &str) -> String {
    decode_entities(INLINE_TAG.replace_all(inner, "").trim())
}

/// Extract the title and abstract from an `efetch` XML body.
///
/// Structured abstracts keep their section labels (`BACKGROUND: ...`), one
/// section per line.
///
/// # Errors
///
/// Returns [`RagError::Dataset`] when the body holds no article title.
pub fn parse_article_xml(id: &str, body: &str) -> Result<ArticleRecord> {
    let title = ARTICLE_TITLE
        .captures(body)
        .map(|caps| element_text(&caps[1]))
        .ok_or_else(|| RagError::Dataset(format!("no PubMed record for {id}")))?;

    let sections: Vec<String> = ABSTRACT_TEXT
        .captures_iter(body)
        .map(|caps| {
            let text = element_text(&caps[2]);
            match LABEL_ATTR.captures(&caps[1]) {
                Some(label) if !label[1].is_empty() => format!("{}: {text}", &label[1]),
                _ => text,
            }
        })
        .filter(|s| !s.is_empty())
        .collect();

    Ok(ArticleRecord { title, abstract_text: sections.join("\n") })
}

/// PubMed through the NCBI E-utilities HTTP API.
pub struct PubMedClient {
    client: Client,
    config: PubMedConfig,
}

impl PubMedClient {
    pub fn new(config: PubMedConfig) -> Result<Self> {
        config.validate()?;
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| RagError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &PubMedConfig {
        &self.config
    }

    fn endpoint(&self, utility: &str) -> String {
        format!("{}/{utility}.fcgi", self.config.base_url.trim_end_matches('/'))
    }

    /// One GET, with status and transport failures mapped to
    /// [`RagError::UpstreamFetch`].
    async fn get_text(&self, utility: &str, params: &[(&str, &str)]) -> Result<String> {
        let response = self
            .client
            .get(self.endpoint(utility))
            .query(params)
            .query(&self.config.identity_params())
            .send()
            .await
            .map_err(|e| {
                let message = if e.is_timeout() {
                    format!("timed out after {} ms", self.config.timeout_ms)
                } else {
                    format!("request failed: {e}")
                };
                error!(service = SERVICE, utility, error = %e, "request failed");
                RagError::UpstreamFetch { service: SERVICE.to_string(), message }
            })?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            error!(service = SERVICE, utility, %status, "rate limited");
            return Err(RagError::UpstreamFetch {
                service: SERVICE.to_string(),
                message: "rate limited".to_string(),
            });
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(service = SERVICE, utility, %status, "API error");
            return Err(RagError::UpstreamFetch {
                service: SERVICE.to_string(),
                message: format!("{utility} returned {status}: {body}"),
            });
        }

        response.text().await.map_err(|e| RagError::UpstreamFetch {
            service: SERVICE.to_string(),
            message: format!("failed to read response body: {e}"),
        })
    }
}

#[async_trait]
impl LiteratureSearch for PubMedClient {
    fn name(&self) -> &str {
        SERVICE
    }

    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<String>> {
        let retmax = max_results.to_string();
        let params =
            [("db", "pubmed"), ("term", query), ("retmode", "json"), ("retmax", retmax.as_str())];
        let body = with_retry(&self.config.retry, "esearch", || self.get_text("esearch", &params))
            .await?;
        let ids = parse_search_response(&body)?;
        info!(service = SERVICE, result_count = ids.len(), "search completed");
        Ok(ids)
    }
}

#[async_trait]
impl ArticleFetcher for PubMedClient {
    async fn fetch(&self, id: &str) -> Result<ArticleRecord> {
        debug!(service = SERVICE, document.id = id, "fetching article");
        let params = [("db", "pubmed"), ("id", id), ("retmode", "xml")];
        let body =
            with_retry(&self.config.retry, "efetch", || self.get_text("efetch", &params)).await?;
        parse_article_xml(id, &body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EFETCH: &str = r#"<?xml version="1.0" ?>
<PubmedArticleSet>
  <PubmedArticle>
    <MedlineCitation Status="MEDLINE" Owner="NLM">
      <PMID Version="1">31452104</PMID>
      <Article PubModel="Print">
        <ArticleTitle>Statin use and <i>all-cause</i> mortality &amp; fractures.</ArticleTitle>
        <Abstract>
          <AbstractText Label="BACKGROUND" NlmCategory="BACKGROUND">Statins are common.</AbstractText>
          <AbstractText Label="RESULTS" NlmCategory="RESULTS">Mortality fell (HR &lt; 1&#8201;.0).</AbstractText>
        </Abstract>
      </Article>
    </MedlineCitation>
  </PubmedArticle>
</PubmedArticleSet>"#;

    #[test]
    fn parses_search_ids_in_order() {
        let body = r#"{"header": {}, "esearchresult": {"count": "2", "idlist": ["31452104", "29900001"]}}"#;
        assert_eq!(parse_search_response(body).unwrap(), ["31452104", "29900001"]);
    }

    #[test]
    fn missing_idlist_is_no_match() {
        assert!(parse_search_response(r#"{"esearchresult": {"count": "0"}}"#).unwrap().is_empty());
        assert!(parse_search_response("{}").unwrap().is_empty());
    }

    #[test]
    fn malformed_search_body_is_upstream_failure() {
        assert!(matches!(
            parse_search_response("<html>busy</html>"),
            Err(RagError::UpstreamFetch { .. })
        ));
    }

    #[test]
    fn parses_title_and_labelled_abstract() {
        let record = parse_article_xml("31452104", EFETCH).unwrap();
        assert_eq!(record.title, "Statin use and all-cause mortality & fractures.");
        assert_eq!(
            record.abstract_text,
            "BACKGROUND: Statins are common.\nRESULTS: Mortality fell (HR < 1\u{2009}.0)."
        );
    }

    #[test]
    fn unlabelled_abstract_is_plain_text() {
        let xml = "<ArticleTitle>T</ArticleTitle><AbstractText>Plain abstract.</AbstractText>";
        assert_eq!(parse_article_xml("1", xml).unwrap().abstract_text, "Plain abstract.");
    }

    #[test]
    fn record_without_abstract_has_empty_abstract() {
        let record = parse_article_xml("1", "<ArticleTitle>Letter</ArticleTitle>").unwrap();
        assert_eq!(record.title, "Letter");
        assert!(record.abstract_text.is_empty());
    }

    #[test]
    fn empty_article_set_is_a_missing_record() {
        let err = parse_article_xml("404", "<PubmedArticleSet></PubmedArticleSet>").unwrap_err();
        assert!(matches!(err, RagError::Dataset(_)));
    }

    #[test]
    fn client_rejects_invalid_config() {
        let config = PubMedConfig { max_parallel_fetches: 0, ..Default::default() };
        assert!(PubMedClient::new(config).is_err());
    }

    #[test]
    fn endpoint_appends_fcgi() {
        let client = PubMedClient::new(PubMedConfig::default()).unwrap();
        assert_eq!(
            client.endpoint("esearch"),
            "https://eutils.ncbi.nlm.nih.gov/entrez/eutils/esearch.fcgi"
        );
    }
}
