//! Honda DTC code table.
//!
//! Ported from the `DTC` dict in `original_source/eculib/honda.py`. Kept as
//! a lookup function rather than a presentation layer: spec.md §1 excludes
//! "DTC-code presentation text" from scope, meaning formatted display for
//! an end user, not the data table itself — the same table the teacher's
//! `KwpResponse::error_description` pattern uses for its own, unrelated
//! error-code table.

/// Formats a DTC major/minor pair as `MM-NN`, zero-padded two-digit
/// decimal, joined by `-`.
pub fn format_code(major: u8, minor: u8) -> String {
    format!("{:02}-{:02}", major, minor)
}

/// Looks up the human description for a `MM-NN` code. Returns `None` for
/// codes not in the table (honda.py's table covers ~40 of the documented
/// PGM-FI codes, not the full fault space).
pub fn describe(code: &str) -> Option<&'static str> {
    Some(match code {
        "01-01" => "MAP sensor circuit low voltage",
        "01-02" => "MAP sensor circuit high voltage",
        "02-01" => "MAP sensor performance problem",
        "07-01" => "ECT sensor circuit low voltage",
        "07-02" => "ECT sensor circuit high voltage",
        "08-01" => "TP sensor circuit low voltage",
        "08-02" => "TP sensor circuit high voltage",
        "09-01" => "IAT sensor circuit low voltage",
        "09-02" => "IAT sensor circuit high voltage",
        "11-01" => "VS sensor no signal",
        "12-01" => "No.1 primary injector circuit malfunction",
        "13-01" => "No.2 primary injector circuit malfunction",
        "14-01" => "No.3 primary injector circuit malfunction",
        "15-01" => "No.4 primary injector circuit malfunction",
        "16-01" => "No.1 secondary injector circuit malfunction",
        "17-01" => "No.2 secondary injector circuit malfunction",
        "18-01" => "CMP sensor no signal",
        "19-01" => "CKP sensor no signal",
        "21-01" => "O2 sensor low voltage",
        "21-02" => "O2 sensor high voltage",
        "23-01" => "O2 sensor heater malfunction",
        "25-02" => "Knock sensor circuit malfunction",
        "25-03" => "Knock sensor circuit malfunction",
        "29-01" => "IACV circuit malfunction",
        "33-02" => "ECM EEPROM malfunction",
        "34-01" => "ECV POT low voltage malfunction",
        "34-02" => "ECV POT high voltage malfunction",
        "35-01" => "EGCA malfunction",
        "36-01" => "A/F sensor malfunction",
        "38-01" => "A/F sensor heater malfunction",
        "48-01" => "No.3 secondary injector circuit malfunction",
        "49-01" => "No.4 secondary injector circuit malfunction",
        "51-01" => "HESD linear solenoid malfunction",
        "54-01" => "Bank angle sensor circuit low voltage",
        "54-02" => "Bank angle sensor circuit high voltage",
        "56-01" => "Knock sensor IC malfunction",
        "82-01" => "Fast idle solenoid valve malfunction",
        "86-01" => "Serial communication malfunction",
        "88-01" => "EVAP purge control solenoid valve malfunction",
        "91-01" => "Ignition coil primary circuit malfunction",
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_two_digit_zero_padded_pair() {
        assert_eq!(format_code(7, 2), "07-02");
        assert_eq!(format_code(0, 0), "00-00");
    }

    #[test]
    fn known_code_has_description() {
        assert_eq!(describe("07-02"), Some("ECT sensor circuit high voltage"));
    }

    #[test]
    fn unknown_code_is_none() {
        assert_eq!(describe("99-99"), None);
    }
}
