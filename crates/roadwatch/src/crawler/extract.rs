// Copyright 2026 Roadwatch Contributors
// SPDX-License-Identifier: Apache-2.0

//! HTML extraction for the driving-school directory.
//!
//! Pure functions over rendered HTML. The directory page yields city links;
//! each city page yields one listing element per school whose data
//! attributes carry the name, a `"lat,lon"` position, and a rating.

use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::config::CrawlSettings;

/// One sub-page of the directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CityLink {
    pub url: Url,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub lat: f64,
    pub lon: f64,
}

/// A driving school extracted from a city page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchoolRecord {
    pub name: String,
    pub coordinate: Coordinate,
    pub rating: Option<f64>,
}

/// A listing element that could not be turned into a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedListing {
    pub index: usize,
    pub reason: String,
}

/// Everything one city page produced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageExtraction {
    pub records: Vec<SchoolRecord>,
    pub skipped: Vec<SkippedListing>,
}

fn selector(css: &str) -> Result<Selector, String> {
    Selector::parse(css).map_err(|e| format!("invalid selector `{css}`: {e}"))
}

/// Collect city links from the directory page, resolved against `base`.
pub fn extract_city_links(
    html: &str,
    base: &Url,
    link_selector: &str,
) -> Result<Vec<CityLink>, String> {
    let sel = selector(link_selector)?;
    let doc = Html::parse_document(html);

    let links = doc
        .select(&sel)
        .filter_map(|el| el.value().attr("href"))
        .map(str::trim)
        .filter(|href| !href.is_empty())
        .filter_map(|href| match base.join(href) {
            Ok(url) => Some(CityLink { url }),
            Err(e) => {
                tracing::warn!("ignoring unresolvable city link `{href}`: {e}");
                None
            }
        })
        .collect();
    Ok(links)
}

/// Extract every listing on a city page.
///
/// Only a broken selector fails the page; a bad listing is skipped.
pub fn extract_listings(html: &str, settings: &CrawlSettings) -> Result<PageExtraction, String> {
    let sel = selector(&settings.listing_selector)?;
    let doc = Html::parse_document(html);
    let mut page = PageExtraction::default();

    for (index, el) in doc.select(&sel).enumerate() {
        let attrs = el.value();
        let record = attrs
            .attr(&settings.name_attr)
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .ok_or_else(|| format!("missing {}", settings.name_attr))
            .and_then(|name| {
                let position = attrs
                    .attr(&settings.position_attr)
                    .ok_or_else(|| format!("missing {}", settings.position_attr))?;
                let coordinate = parse_position(position)?;
                Ok(SchoolRecord {
                    name: name.to_string(),
                    coordinate,
                    rating: attrs.attr(&settings.rating_attr).and_then(parse_rating),
                })
            });

        match record {
            Ok(record) => page.records.push(record),
            Err(reason) => page.skipped.push(SkippedListing { index, reason }),
        }
    }
    Ok(page)
}

/// Parse `"lat,lon"`. Anything but exactly two finite numbers is rejected.
pub fn parse_position(raw: &str) -> Result<Coordinate, String> {
    let parts: Vec<&str> = raw.split(',').map(str::trim).collect();
    let [lat, lon] = parts.as_slice() else {
        return Err(format!(
            "position `{raw}` has {} part(s), expected 2",
            parts.len()
        ));
    };
    let parse = |s: &str| {
        s.parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .ok_or_else(|| format!("position `{raw}`: `{s}` is not a coordinate"))
    };
    Ok(Coordinate {
        lat: parse(*lat)?,
        lon: parse(*lon)?,
    })
}

/// Ratings may use a decimal comma; empty or non-numeric means unrated.
fn parse_rating(raw: &str) -> Option<f64> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    raw.replace(',', ".")
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn listing(name: &str, position: &str, note: &str) -> String {
        format!(
            r#"<div class="vv-search-item" data-name="{name}" data-position="{position}" data-note="{note}">
                 <h3 class="vv-search-item__content__title">{name}</h3>
               </div>"#
        )
    }

    #[test]
    fn test_links_resolve_against_base() {
        let base = Url::parse("https://www.vroomvroom.fr/auto-ecoles/hauts-de-seine/").unwrap();
        let html = r#"
            <ul>
              <li><a class="vv-department__link" href="/auto-ecoles/antony/">Antony</a></li>
              <li><a class="vv-department__link" href="https://www.vroomvroom.fr/auto-ecoles/bagneux/">Bagneux</a></li>
              <li><a class="vv-department__link" href="  ">Empty</a></li>
              <li><a class="other" href="/ignored/">Other</a></li>
              <li><a class="vv-department__link" href="clamart/">Clamart</a></li>
            </ul>"#;

        let links = extract_city_links(html, &base, ".vv-department__link").unwrap();
        let urls: Vec<&str> = links.iter().map(|l| l.url.as_str()).collect();
        assert_eq!(
            urls,
            vec![
                "https://www.vroomvroom.fr/auto-ecoles/antony/",
                "https://www.vroomvroom.fr/auto-ecoles/bagneux/",
                "https://www.vroomvroom.fr/auto-ecoles/hauts-de-seine/clamart/",
            ]
        );
    }

    #[test]
    fn test_listings_extracted() {
        let html = format!(
            "<main>{}{}</main>",
            listing("ECF Antony", "48.7540,2.2975", "4.6"),
            listing("Auto-école du Centre", "48.7512, 2.3001", ""),
        );
        let page = extract_listings(&html, &CrawlSettings::default()).unwrap();

        assert!(page.skipped.is_empty());
        assert_eq!(page.records.len(), 2);
        assert_eq!(page.records[0].name, "ECF Antony");
        assert_eq!(
            page.records[0].coordinate,
            Coordinate {
                lat: 48.7540,
                lon: 2.2975
            }
        );
        assert_eq!(page.records[0].rating, Some(4.6));
        assert_eq!(page.records[1].rating, None);
    }

    #[test]
    fn test_single_coordinate_listing_is_skipped() {
        let html = format!(
            "<main>{}{}{}</main>",
            listing("First", "48.8,2.3", "4"),
            listing("Broken", "48.8", "5"),
            listing("Last", "48.9,2.2", "3,5"),
        );
        let page = extract_listings(&html, &CrawlSettings::default()).unwrap();

        let names: Vec<&str> = page.records.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["First", "Last"]);
        assert_eq!(page.records[1].rating, Some(3.5));
        assert_eq!(page.skipped.len(), 1);
        assert_eq!(page.skipped[0].index, 1);
    }

    #[test]
    fn test_position_parsing() {
        assert!(parse_position("48.8").is_err());
        assert!(parse_position("48.8,2.2,1").is_err());
        assert!(parse_position("48.8,east").is_err());
        assert!(parse_position(",").is_err());
        assert!(parse_position("NaN,2.2").is_err());
        assert_eq!(
            parse_position(" 48.8 , -2.25 ").unwrap(),
            Coordinate { lat: 48.8, lon: -2.25 }
        );
    }

    #[test]
    fn test_missing_attributes_are_skipped() {
        let html = r#"
            <div class="vv-search-item" data-position="48.8,2.3"></div>
            <div class="vv-search-item" data-name="No Position"></div>
            <div class="vv-search-item" data-name="Ok" data-position="48.8,2.3"></div>"#;
        let page = extract_listings(html, &CrawlSettings::default()).unwrap();
        assert_eq!(page.records.len(), 1);
        assert_eq!(page.records[0].rating, None);
        assert_eq!(page.skipped.len(), 2);
    }

    #[test]
    fn test_bad_selector_fails_page() {
        let settings = CrawlSettings {
            listing_selector: "[[[".to_string(),
            ..CrawlSettings::default()
        };
        assert!(extract_listings("<div></div>", &settings).is_err());
    }
}
