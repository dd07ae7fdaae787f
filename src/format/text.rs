//! Human-readable text output formatter

use crate::change_detection::AddressChangeEvent;
use crate::error::Result;
use crate::format::{AddressReport, OutputFormatter};
use crate::position::Position;
use chrono::{DateTime, SecondsFormat, Utc};

/// Text formatter - outputs the address the way a Brazilian reader expects it
pub struct TextFormatter;

fn or_dash(value: Option<&str>) -> &str {
    value.unwrap_or("-")
}

fn position_line(position: &Position, report: &AddressReport) -> String {
    let time = DateTime::<Utc>::from_timestamp_millis(position.timestamp())
        .map(|t| t.to_rfc3339_opts(SecondsFormat::Secs, true))
        .unwrap_or_else(|| position.timestamp().to_string());
    let quality = report
        .accuracy_quality
        .map(|q| format!(" ({})", q))
        .unwrap_or_default();

    format!(
        "Posição: ({:.6}, {:.6}) ±{:.0}m{} em {}\n",
        position.latitude(),
        position.longitude(),
        position.accuracy(),
        quality,
        time
    )
}

impl OutputFormatter for TextFormatter {
    fn name(&self) -> &str {
        "text"
    }

    fn description(&self) -> &str {
        "Human-readable Brazilian address"
    }

    fn format(&self, report: &AddressReport) -> Result<String> {
        let mut output = String::new();

        if let Some(position) = &report.position {
            output.push_str(&position_line(position, report));
        }

        if let Some(error) = &report.error {
            output.push_str(&format!("Erro: {}\n", error.user_message));
            return Ok(output);
        }

        let Some(address) = &report.address else {
            output.push_str("Endereço: -\n");
            return Ok(output);
        };

        output.push_str(&format!(
            "Endereço: {}\n",
            or_dash(address.logradouro_completo().as_deref())
        ));
        output.push_str(&format!("Bairro: {}\n", or_dash(address.bairro.as_deref())));
        output.push_str(&format!(
            "Município: {}\n",
            or_dash(address.municipio_completo().as_deref())
        ));
        output.push_str(&format!(
            "Estado: {}\n",
            or_dash(address.uf.as_deref().or(address.sigla_uf.as_deref()))
        ));
        output.push_str(&format!("CEP: {}\n", or_dash(address.cep.as_deref())));
        output.push_str(&format!("País: {}\n", or_dash(address.pais.as_deref())));

        Ok(output)
    }

    fn format_change(&self, event: &AddressChangeEvent) -> Result<String> {
        Ok(format!(
            "[{}] {} -> {}\n",
            event.change_type,
            or_dash(event.details.previous.as_deref()),
            or_dash(event.details.current.as_deref())
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::fixtures;
    use crate::geocoder::GeocodeFailure;

    #[test]
    fn test_text_format() {
        let output = TextFormatter.format(&fixtures::report()).unwrap();

        assert!(output.contains("Posição: (-23.550500, -46.633300) ±12m (good)"));
        assert!(output.contains("2023-11-14T22:13:20Z"));
        assert!(output.contains("Endereço: Praça da Sé\n"));
        assert!(output.contains("Bairro: Sé\n"));
        assert!(output.contains("Município: São Paulo, SP\n"));
        assert!(output.contains("CEP: 01001-000\n"));
        assert!(output.contains("País: Brasil\n"));
    }

    #[test]
    fn test_missing_fields_render_as_dash() {
        let mut report = fixtures::report();
        if let Some(address) = report.address.as_mut() {
            address.cep = None;
            address.bairro = None;
        }

        let output = TextFormatter.format(&report).unwrap();
        assert!(output.contains("Bairro: -\n"));
        assert!(output.contains("CEP: -\n"));
    }

    #[test]
    fn test_error_report() {
        let mut report = fixtures::report();
        report.address = None;
        report.error = Some(GeocodeFailure {
            user_message: "Serviço temporariamente indisponível".to_string(),
            detail: "HTTP 425".to_string(),
            status: Some(425),
        });

        let output = TextFormatter.format(&report).unwrap();
        assert!(output.contains("Erro: Serviço temporariamente indisponível"));
        assert!(!output.contains("Endereço:"));
    }

    #[test]
    fn test_change_format() {
        let output = TextFormatter.format_change(&fixtures::bairro_change()).unwrap();
        assert_eq!(output, "[BairroChanged] República -> Sé\n");
    }

    #[test]
    fn test_text_formatter_info() {
        let formatter = TextFormatter;
        assert_eq!(formatter.name(), "text");
        assert!(!formatter.description().is_empty());
    }
}
