//! Prompts for vision-model extraction of water-analysis forms.
//!
//! Centralising every prompt here keeps one place to edit and lets unit tests
//! check that the prompt still names every canonical key the normalizer
//! reads first. Callers can override the system prompt via
//! [`crate::config::ParseConfig::system_prompt`]; the extraction prompt is
//! always sent with the page image.

/// Default system prompt, used when `ParseConfig::system_prompt` is `None`.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are an expert in drinking-water analysis. \
You read scanned laboratory forms and transcribe them into structured JSON so that \
water-treatment equipment can be selected automatically. Use camelCase for every JSON key.";

/// User message sent together with each page image.
pub const EXTRACTION_PROMPT: &str = r#"Read this water-analysis form or lab report and return its data as JSON:

{
  "blankNumber": "form number, or an empty string",
  "analysisDate": "analysis date, or an empty string",
  "customerName": "customer name, or an empty string",
  "customerPhone": "customer phone, or an empty string",
  "objectAddress": "address of the site, or an empty string",
  "intakeType": "water source (borehole / well / mains), or an empty string",
  "appearance": "visual appearance of the water, or an empty string",
  "sampleDate": "sampling date, or an empty string",
  "testDate": "test date, or an empty string",
  "parameters": [
    {
      "name": "parameter name exactly as printed",
      "value": 8.3,
      "unit": "unit of measure",
      "thresholdLimit": 7.0,
      "code": "short latin code"
    }
  ],
  "notes": "short water-treatment recommendations"
}

RULES:
- parameters lists EVERY quantitative measurement on the page
- value is a number only ("<0.1" or "less than 0.1" becomes 0.05, "not detected" becomes 0)
- thresholdLimit is the regulatory limit printed on the form or known from SanPiN, otherwise null
- code is a short lowercase latin code (hardness, ph, iron, manganese, nitrates, tds, conductivity, ...)
- keep names, units and free text in the language of the form
- reply with valid JSON ONLY, without markdown fences"#;
