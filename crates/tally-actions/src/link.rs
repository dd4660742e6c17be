// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result, bail};
use tally_app::{ActionHandler, ActionOutcome, Record, RecordId, RenderedResult, StatusSink};
use url::Url;
use url::form_urlencoded::byte_serialize;

const PLACEHOLDER: &str = "{id}";

/// Resolves a dashboard URL for the record and hands it back for display.
#[derive(Debug, Clone)]
pub struct LinkHandler {
    label: String,
    template: String,
}

impl LinkHandler {
    pub fn new(label: &str, template: &str) -> Result<Self> {
        check_template(template)?;
        Ok(Self {
            label: label.to_owned(),
            template: template.to_owned(),
        })
    }

    pub fn resolve(&self, id: &RecordId) -> Result<Url> {
        let encoded = byte_serialize(id.as_str().as_bytes()).collect::<String>();
        let raw = self.template.replace(PLACEHOLDER, &encoded);
        Url::parse(&raw).with_context(|| format!("resolved link {raw:?} is not a valid URL"))
    }
}

pub(crate) fn check_template(template: &str) -> Result<()> {
    if !template.contains(PLACEHOLDER) {
        bail!("link url {template:?} must contain the {PLACEHOLDER} placeholder");
    }
    let sample = template.replace(PLACEHOLDER, "sample");
    let parsed = Url::parse(&sample).with_context(|| format!("invalid link url {template:?}"))?;
    if parsed.cannot_be_a_base() {
        bail!("link url {template:?} must be absolute");
    }
    Ok(())
}

impl ActionHandler for LinkHandler {
    fn run(
        &self,
        id: &RecordId,
        record: &Record,
        _status: &dyn StatusSink,
    ) -> Result<ActionOutcome> {
        let url = self.resolve(id)?;
        Ok(ActionOutcome::Rendered(RenderedResult {
            title: format!("{} - {}", self.label, record.name),
            body: url.to_string(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::{LinkHandler, check_template};
    use anyhow::Result;
    use tally_app::{ActionHandler, ActionOutcome, Record, RecordId, StatusSink};

    struct Silent;

    impl StatusSink for Silent {
        fn report(&self, _id: &RecordId, _message: &str) {}
    }

    #[test]
    fn renders_resolved_url() -> Result<()> {
        let handler = LinkHandler::new("Dashboard", "https://billing.example/c/{id}/overview")?;
        let record = Record::new("cus_42", "Acme Rockets");
        let outcome = handler.run(&record.id, &record, &Silent)?;
        let ActionOutcome::Rendered(rendered) = outcome else {
            panic!("link actions render a result");
        };
        assert_eq!(rendered.title, "Dashboard - Acme Rockets");
        assert_eq!(rendered.body, "https://billing.example/c/cus_42/overview");
        Ok(())
    }

    #[test]
    fn ids_are_percent_encoded() -> Result<()> {
        let handler = LinkHandler::new("Dashboard", "https://billing.example/search?q={id}")?;
        let url = handler.resolve(&RecordId::new("a b&c"))?;
        assert_eq!(url.query(), Some("q=a+b%26c"));
        Ok(())
    }

    #[test]
    fn relative_templates_are_rejected() {
        assert!(check_template("/customers/{id}").is_err());
        assert!(check_template("mailto:{id}").is_err());
    }
}
