//! Brazilian federative units

/// (state name, UF code)
pub const STATES: [(&str, &str); 27] = [
    ("Acre", "AC"),
    ("Alagoas", "AL"),
    ("Amapá", "AP"),
    ("Amazonas", "AM"),
    ("Bahia", "BA"),
    ("Ceará", "CE"),
    ("Distrito Federal", "DF"),
    ("Espírito Santo", "ES"),
    ("Goiás", "GO"),
    ("Maranhão", "MA"),
    ("Mato Grosso", "MT"),
    ("Mato Grosso do Sul", "MS"),
    ("Minas Gerais", "MG"),
    ("Pará", "PA"),
    ("Paraíba", "PB"),
    ("Paraná", "PR"),
    ("Pernambuco", "PE"),
    ("Piauí", "PI"),
    ("Rio de Janeiro", "RJ"),
    ("Rio Grande do Norte", "RN"),
    ("Rio Grande do Sul", "RS"),
    ("Rondônia", "RO"),
    ("Roraima", "RR"),
    ("Santa Catarina", "SC"),
    ("São Paulo", "SP"),
    ("Sergipe", "SE"),
    ("Tocantins", "TO"),
];

/// UF code for a state name (case-insensitive)
pub fn uf_for_state(name: &str) -> Option<&'static str> {
    let name = name.trim().to_lowercase();
    STATES
        .iter()
        .find(|(state, _)| state.to_lowercase() == name)
        .map(|(_, uf)| *uf)
}

/// State name for a UF code (case-insensitive)
pub fn state_for_uf(uf: &str) -> Option<&'static str> {
    STATES
        .iter()
        .find(|(_, code)| code.eq_ignore_ascii_case(uf.trim()))
        .map(|(state, _)| *state)
}
