// Copyright (c) 2025 SOLARE S.R.O.
//
// This file is part of Irrigo.
//
// Licensed under the Creative Commons Attribution-NonCommercial-NoDerivatives 4.0 International
// (CC BY-NC-ND 4.0). You may use and share this file for non-commercial purposes only and you may not
// create derivatives. See <https://creativecommons.org/licenses/by-nc-nd/4.0/>.
//
// This software is provided "AS IS", without warranty of any kind.
//
// For commercial licensing, please contact: info@solare.cz

//! Yahoo weather: woeid lookup plus the forecast RSS condition tag.

use super::WeatherError;
use irrigo_types::{ConditionCode, WeatherCondition};
use reqwest::Client;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct YahooClient {
    client: Client,
    query_base: String,
    forecast_base: String,
}

impl YahooClient {
    pub fn new(
        client: Client,
        query_base: impl Into<String>,
        forecast_base: impl Into<String>,
    ) -> Self {
        Self {
            client,
            query_base: query_base.into().trim_end_matches('/').to_owned(),
            forecast_base: forecast_base.into().trim_end_matches('/').to_owned(),
        }
    }

    /// Where-on-earth id of a free-form location
    pub async fn woeid(&self, location: &str) -> Result<String, WeatherError> {
        let location = location.trim();
        if location.is_empty() {
            return Err(WeatherError::MissingLocation);
        }

        let query = format!("select woeid from geo.placefinder where text=\"{location}\"");
        let body = self
            .client
            .get(format!("{}/v1/public/yql", self.query_base))
            .query(&[("q", query.as_str())])
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        tag_text(&body, "woeid")
            .filter(|id| !id.is_empty() && id.chars().all(|c| c.is_ascii_digit()))
            .map(str::to_owned)
            .ok_or_else(|| WeatherError::LocationNotFound(location.to_owned()))
    }

    pub async fn condition(&self, location: &str) -> Result<WeatherCondition, WeatherError> {
        let woeid = self.woeid(location).await?;
        debug!("Fetching Yahoo forecast for woeid {woeid}");
        let body = self
            .client
            .get(format!("{}/forecastrss", self.forecast_base))
            .query(&[("w", woeid.as_str())])
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        parse_condition(&body)
    }
}

/// Text between `<name>` and `</name>`
fn tag_text<'a>(body: &'a str, name: &str) -> Option<&'a str> {
    let open = format!("<{name}>");
    let close = format!("</{name}>");
    let start = body.find(&open)? + open.len();
    let rest = body.get(start..)?;
    let end = rest.find(&close)?;
    rest.get(..end).map(str::trim)
}

/// Value of `name="..."` inside a tag
fn attribute<'a>(tag: &'a str, name: &str) -> Option<&'a str> {
    let marker = format!("{name}=\"");
    let start = tag
        .match_indices(&marker)
        .map(|(i, _)| i)
        .find(|&i| {
            i == 0
                || tag
                    .get(..i)
                    .is_some_and(|before| before.ends_with(char::is_whitespace))
        })?
        + marker.len();
    let rest = tag.get(start..)?;
    let end = rest.find('"')?;
    rest.get(..end)
}

fn parse_condition(body: &str) -> Result<WeatherCondition, WeatherError> {
    let start = body
        .find("<yweather:condition")
        .ok_or_else(|| WeatherError::InvalidData("missing yweather:condition".to_owned()))?;
    let rest = body.get(start..).unwrap_or_default();
    let tag = rest.find('>').and_then(|end| rest.get(..end)).unwrap_or(rest);

    let text = attribute(tag, "text")
        .ok_or_else(|| WeatherError::InvalidData("condition without text".to_owned()))?;
    let code = attribute(tag, "code")
        .and_then(|c| c.parse::<u32>().ok())
        .ok_or_else(|| WeatherError::InvalidData("condition without numeric code".to_owned()))?;

    Ok(WeatherCondition {
        text: text.to_owned(),
        code: ConditionCode::Yahoo(code),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};

    const RSS: &str = r#"<rss><channel><item>
        <yweather:condition  text="Light Rain Shower"  code="11"  temp="12"  date="Mon, 02 Jun 2025 8:00 am CEST" />
    </item></channel></rss>"#;

    #[test]
    fn test_parse_condition() {
        let condition = parse_condition(RSS).unwrap();
        assert_eq!(condition.text, "Light Rain Shower");
        assert_eq!(condition.code, ConditionCode::Yahoo(11));

        assert!(parse_condition("<rss/>").is_err());
    }

    #[test]
    fn test_tag_text() {
        assert_eq!(tag_text("<r><woeid>796597</woeid></r>", "woeid"), Some("796597"));
        assert_eq!(tag_text("<r></r>", "woeid"), None);
    }

    #[tokio::test]
    async fn test_condition_lookup() {
        let mut server = Server::new_async().await;
        let lookup = server
            .mock("GET", "/v1/public/yql")
            .match_query(Matcher::Regex("Brno".into()))
            .with_status(200)
            .with_body("<query><results><Result><woeid>786770</woeid></Result></results></query>")
            .create_async()
            .await;
        let forecast = server
            .mock("GET", "/forecastrss")
            .match_query(Matcher::UrlEncoded("w".into(), "786770".into()))
            .with_status(200)
            .with_body(RSS)
            .create_async()
            .await;

        let client = YahooClient::new(Client::new(), server.url(), server.url());
        let condition = client.condition("Brno").await.unwrap();

        assert_eq!(condition.code, ConditionCode::Yahoo(11));
        lookup.assert_async().await;
        forecast.assert_async().await;
    }

    #[tokio::test]
    async fn test_unknown_location() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/v1/public/yql")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body("<query><results/></query>")
            .create_async()
            .await;

        let client = YahooClient::new(Client::new(), server.url(), server.url());
        let result = client.woeid("Nowhere").await;

        assert!(matches!(result, Err(WeatherError::LocationNotFound(_))));
    }
}
