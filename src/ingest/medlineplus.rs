//! Reader for the MedlinePlus health-topic XML export.

use quick_xml::events::{ BytesStart, Event };
use quick_xml::Reader;

pub const SOURCE_NAME: &str = "MedlinePlus";

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HealthTopic {
    pub title: String,
    pub url: String,
    /// Plain text of `<full-summary>`; empty when the topic has none.
    pub summary: String,
}

fn attribute(e: &BytesStart<'_>, name: &str) -> Result<String, quick_xml::Error> {
    match e.try_get_attribute(name)? {
        Some(attr) => Ok(attr.unescape_value()?.into_owned()),
        None => Ok(String::new()),
    }
}

/// Strips tags from an HTML fragment, joining its text nodes with newlines.
pub fn html_to_text(html: &str) -> String {
    let fragment = scraper::Html::parse_fragment(html);
    fragment.root_element().text().collect::<Vec<_>>().join("\n")
}

pub fn parse_health_topics(xml: &str) -> Result<Vec<HealthTopic>, quick_xml::Error> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(false);

    let mut topics = Vec::new();
    let mut current: Option<HealthTopic> = None;
    let mut depth_in_topic = 0usize;
    let mut summary_html: Option<String> = None;

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                if current.is_some() {
                    depth_in_topic += 1;
                    if depth_in_topic == 1 && e.local_name().as_ref() == b"full-summary" {
                        summary_html = Some(String::new());
                    }
                } else if e.local_name().as_ref() == b"health-topic" {
                    current = Some(HealthTopic {
                        title: attribute(&e, "title")?,
                        url: attribute(&e, "url")?,
                        summary: String::new(),
                    });
                    depth_in_topic = 0;
                }
            }
            Event::Empty(e) => {
                if current.is_none() && e.local_name().as_ref() == b"health-topic" {
                    topics.push(HealthTopic {
                        title: attribute(&e, "title")?,
                        url: attribute(&e, "url")?,
                        summary: String::new(),
                    });
                }
            }
            Event::Text(e) => {
                if let Some(html) = summary_html.as_mut() {
                    html.push_str(&e.unescape()?);
                }
            }
            Event::CData(e) => {
                if let Some(html) = summary_html.as_mut() {
                    html.push_str(&String::from_utf8_lossy(&e));
                }
            }
            Event::End(e) => {
                if current.is_some() {
                    if depth_in_topic == 0 {
                        topics.extend(current.take());
                    } else {
                        if depth_in_topic == 1 && e.local_name().as_ref() == b"full-summary" {
                            if let (Some(topic), Some(html)) = (current.as_mut(), summary_html.take()) {
                                topic.summary = html_to_text(&html);
                            }
                        }
                        depth_in_topic -= 1;
                    }
                }
            }
            Event::Eof => {
                break;
            }
            _ => {}
        }
    }

    Ok(topics)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str =
        r#"<?xml version="1.0" encoding="UTF-8"?>
<health-topics total="2">
  <health-topic title="Asthma" url="https://medlineplus.gov/asthma.html" language="English">
    <also-called>Bronchial asthma</also-called>
    <full-summary>&lt;p&gt;Asthma is a chronic disease that affects your &lt;a href="x"&gt;airways&lt;/a&gt;.&lt;/p&gt;&lt;ul&gt;&lt;li&gt;Wheezing&lt;/li&gt;&lt;/ul&gt;</full-summary>
    <related-topic url="https://medlineplus.gov/copd.html">COPD</related-topic>
  </health-topic>
  <health-topic title="Flu &amp; Colds" url="https://medlineplus.gov/flu.html">
  </health-topic>
</health-topics>"#;

    #[test]
    fn extracts_titles_urls_and_plain_summaries() {
        let topics = parse_health_topics(SAMPLE).unwrap();
        assert_eq!(topics.len(), 2);

        assert_eq!(topics[0].title, "Asthma");
        assert_eq!(topics[0].url, "https://medlineplus.gov/asthma.html");
        assert_eq!(
            topics[0].summary,
            "Asthma is a chronic disease that affects your \nairways\n.\nWheezing"
        );
        assert!(!topics[0].summary.contains('<'));

        assert_eq!(topics[1].title, "Flu & Colds");
        assert_eq!(topics[1].summary, "");
    }

    #[test]
    fn cdata_summaries_are_supported() {
        let xml =
            r#"<health-topics><health-topic title="A" url="u"><full-summary><![CDATA[<p>Hello</p>]]></full-summary></health-topic></health-topics>"#;
        let topics = parse_health_topics(xml).unwrap();
        assert_eq!(topics[0].summary, "Hello");
    }

    #[test]
    fn malformed_xml_is_an_error() {
        assert!(parse_health_topics("<health-topics><health-topic title='a'></health-topics>").is_err());
    }
}
