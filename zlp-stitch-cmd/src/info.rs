use anyhow::{Context, Result};
use handlebars::handlebars_helper;
use hifitime::Duration;
use serde::Serialize;
use std::{
    io::{stdout, Write},
    path::Path,
};
use zlp_stitch::summary::Summary;

#[derive(Debug, Clone)]
pub enum Format {
    Json,
    Text,
}

impl clap::ValueEnum for Format {
    fn value_variants<'a>() -> &'a [Self] {
        &[Self::Json, Self::Text]
    }

    fn to_possible_value(&self) -> Option<clap::builder::PossibleValue> {
        match self {
            Self::Json => Some(clap::builder::PossibleValue::new("json")),
            Self::Text => Some(clap::builder::PossibleValue::new("text")),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
struct Info {
    filename: String,
    /// Time between the first and last frame.
    duration: Option<String>,
    summary: Summary,
}

fn summarize(fpath: &Path) -> Result<Info> {
    let summary = Summary::from_path(fpath).with_context(|| format!("reading {fpath:?}"))?;
    Ok(Info {
        filename: fpath.to_string_lossy().to_string(),
        duration: summary
            .time
            .as_ref()
            .map(|span| {
                let duration: Duration = span.end - span.start;
                duration.to_string()
            }),
        summary,
    })
}

pub fn info(fpath: &Path, format: &Format) -> Result<()> {
    let info = summarize(fpath)?;

    match format {
        Format::Json => {
            serde_json::to_writer_pretty(stdout(), &info).context("serializing to json")
        }
        Format::Text => {
            let data = render_text(&info).context("serializing info")?;
            stdout()
                .write_all(str::as_bytes(&data))
                .context("writing to stdout")
        }
    }
}

fn render_text(info: &Info) -> Result<String> {
    handlebars_helper!(left_pad: |num: u64, v: Json| {
        let v = match v {
            serde_json::Value::String(s) => s.to_owned(),
            serde_json::Value::Null => String::new(),
            _ => v.to_string()
        };
        let num = usize::try_from(num).unwrap_or_default().max(v.len());
        format!("{v:>num$}")
    });
    let mut hb = handlebars::Handlebars::new();
    hb.register_helper("lpad", Box::new(left_pad));
    hb.register_template_string("info", TEXT_TEMPLATE)
        .context("registering template")?;

    hb.render("info", &info).context("rendering text")
}

const TEXT_TEMPLATE: &str = r"{{ filename }}
===============================================================================================
Frames:    {{ summary.frames }}
Apertures: {{ summary.apertures }}
First:     {{ summary.time.start }} (MJD {{ summary.time.start_mjd }})
Last:      {{ summary.time.end }} (MJD {{ summary.time.end_mjd }})
Duration:  {{ duration }}
Images:    {{ #each summary.images }}{{ this }}{{ #if @last }}{{ else }}, {{ /if }}{{ /each }}
-----------------------------------------------------------------------------------------------
Table        Column                          Format
-----------------------------------------------------------------------------------------------
{{ #each summary.imagelist }}IMAGELIST    {{ lpad 30 name }}  {{ lpad 6 tform }}
{{/each }}{{ #each summary.catalogue }}CATALOGUE    {{ lpad 30 name }}  {{ lpad 6 tform }}
{{/each }}
";
