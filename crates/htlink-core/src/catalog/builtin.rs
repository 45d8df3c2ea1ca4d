// ── Built-in heat pump catalog ──
//
// Parameter table for Heliotherm-family devices. Measurements (MP bank)
// are polled in bulk; settings (SP bank) are read one at a time.

use std::sync::{Arc, LazyLock};

use super::descriptor::{Category, DataKind, ParameterDescriptor, QueryClass};
use super::Catalog;

const TENTHS: DataKind = DataKind::Float { scale: 1 };

/// Operating modes of the `betriebsart` parameter.
pub const OPERATING_MODES: [(i64, &str); 8] = [
    (0, "off"),
    (1, "heating"),
    (2, "cooling"),
    (3, "hot_water"),
    (4, "heating_cooling"),
    (5, "auto"),
    (6, "emergency"),
    (7, "standby"),
];

/// Curated selection used when a profile selects nothing.
const DEFAULT_SELECTION: &[&str] = &[
    "temp_aussen",
    "temp_aussen_verzoegert",
    "temp_brauchwasser",
    "temp_vorlauf",
    "temp_ruecklauf",
    "temp_eq_eintritt",
    "temp_eq_austritt",
    "temp_sauggas",
    "heizkreispumpe",
    "eq_pumpe_ventilator",
    "zirkulationspumpe_ww",
    "verdichter",
    "stoerung",
    "warmwasservorrang",
    "hauptschalter",
    "fws_stroemungsschalter",
    "hkr_soll_raum",
    "ww_normaltemp",
    "ww_minimaltemp",
    "hkr_rlt_soll_ohg",
    "hkr_rlt_soll_0",
    "hkr_rlt_soll_uhg",
    "betriebsart",
    "bsz_verdichter_schaltungen",
    "bsz_hkp_betriebsstunden",
    "bsz_eq_betriebsstunden",
    "bsz_wwv_betriebsstunden",
];

static BUILTIN: LazyLock<Arc<Catalog>> = LazyLock::new(|| Arc::new(build()));

pub(super) fn shared() -> Arc<Catalog> {
    Arc::clone(&BUILTIN)
}

fn temperature(id: &str, name: &str, number: u16) -> ParameterDescriptor {
    ParameterDescriptor::new(id, name, QueryClass::Bulk, number, TENTHS).with_unit("°C")
}

fn status(id: &str, name: &str, number: u16) -> ParameterDescriptor {
    ParameterDescriptor::new(id, name, QueryClass::Bulk, number, DataKind::Bool)
}

fn counter(id: &str, name: &str, number: u16, unit: Option<&str>) -> ParameterDescriptor {
    let desc = ParameterDescriptor::new(id, name, QueryClass::Bulk, number, DataKind::Int);
    match unit {
        Some(unit) => desc.with_unit(unit),
        None => desc,
    }
}

fn setpoint(id: &str, name: &str, number: u16, kind: DataKind, unit: &str) -> ParameterDescriptor {
    ParameterDescriptor::new(id, name, QueryClass::Individual, number, kind)
        .read_write()
        .with_unit(unit)
        .in_category(Category::Setpoint)
}

#[allow(clippy::too_many_lines)]
fn descriptors() -> Vec<ParameterDescriptor> {
    vec![
        // ── Temperatures ──
        temperature("temp_aussen", "Temp. Aussen", 0),
        temperature("temp_aussen_verzoegert", "Temp. Aussen verzoegert", 1),
        temperature("temp_brauchwasser", "Temp. Brauchwasser", 2),
        temperature("temp_vorlauf", "Temp. Vorlauf", 3),
        temperature("temp_ruecklauf", "Temp. Ruecklauf", 4),
        temperature("temp_eq_eintritt", "Temp. EQ_Eintritt", 6),
        temperature("temp_eq_austritt", "Temp. EQ_Austritt", 7),
        temperature("temp_sauggas", "Temp. Sauggas", 8),
        temperature("temp_verdampfung", "Temp. Verdampfung", 9),
        temperature("temp_kondensation", "Temp. Kondensation", 10),
        temperature("temp_heissgas", "Temp. Heissgas", 11),
        temperature("temp_frischwasser_istwert", "Temp. Frischwasser_Istwert", 22),
        temperature("hkr_sollwert", "HKR_Sollwert", 25),
        // ── Pressures ──
        ParameterDescriptor::new("niederdruck", "Niederdruck (bar)", QueryClass::Bulk, 12, TENTHS)
            .with_unit("bar")
            .in_category(Category::Pressure),
        ParameterDescriptor::new("hochdruck", "Hochdruck (bar)", QueryClass::Bulk, 13, TENTHS)
            .with_unit("bar")
            .in_category(Category::Pressure),
        // ── Status ──
        status("heizkreispumpe", "Heizkreispumpe", 14),
        status("verdichter", "Verdichter", 16),
        status("stoerung", "Stoerung", 17),
        status("eq_pumpe_ventilator", "EQ Pumpe (Ventilator)", 29),
        status("warmwasservorrang", "Warmwasservorrang", 30),
        status("zirkulationspumpe_ww", "Zirkulationspumpe WW", 31),
        status("hauptschalter", "Hauptschalter", 33),
        status("fws_stroemungsschalter", "FWS Stroemungsschalter", 34),
        ParameterDescriptor::new("verdichter_status", "Verdichter_Status", QueryClass::Bulk, 35, DataKind::Int)
            .in_category(Category::Status),
        ParameterDescriptor::new("verdichteranforderung", "Verdichteranforderung", QueryClass::Bulk, 36, DataKind::Int)
            .in_category(Category::Status),
        ParameterDescriptor::new("frischwasserpumpe", "Frischwasserpumpe", QueryClass::Bulk, 37, DataKind::Int)
            .with_unit("%")
            .in_category(Category::Status),
        // ── Statistics ──
        counter("verdichter_laeuft_seit", "Verdichter laeuft seit", 38, Some("s")),
        counter("verdichter_einschaltverz", "Verdichter Einschaltverz.(sec)", 39, Some("s")),
        counter("bsz_verdichter_schaltungen", "BSZ Verdichter Schaltungen", 40, None),
        counter("bsz_hkp_betriebsstunden", "BSZ HKP Betriebsstunden", 41, Some("h")),
        counter("bsz_eq_betriebsstunden", "BSZ EQ Betriebsstunden", 42, Some("h")),
        counter("bsz_wwv_betriebsstunden", "BSZ WWV Betriebsstunden", 43, Some("h")),
        counter("bsz_zipww_betriebsstunden", "BSZ ZIPWW Betriebsstunden", 44, Some("h")),
        counter("bsz_verdichter_betriebsst_ww", "BSZ Verdichter Betriebsst. WW", 45, Some("h")),
        counter("bsz_verdichter_betriebsst_hkr", "BSZ Verdichter Betriebsst. HKR", 46, Some("h")),
        counter("bsz_verdichter_betriebsst_ges", "BSZ Verdichter Betriebsst. ges", 47, Some("h")),
        counter("bsz_verdichter_akt_laufzeit", "BSZ Verdichter akt. Laufzeit", 48, Some("min")),
        counter("bsz_verdichter_schaltung_ww", "BSZ Verdichter Schaltung WW", 49, None),
        counter("bsz_hkp_schaltung", "BSZ HKP Schaltung", 50, None),
        counter("bsz_eq_schaltungen", "BSZ EQ Schaltungen", 51, None),
        counter("bsz_wwv_schaltungen", "BSZ WWV Schaltungen", 52, None),
        counter("bsz_zipww_schaltungen", "BSZ ZIPWW Schaltungen", 53, None),
        // ── Setpoints ──
        setpoint("hkr_rlt_soll_ohg", "HKR RLT Soll_oHG (Heizkurve)", 21, TENTHS, "°C")
            .with_range(10.0, 75.0, Some(0.5)),
        setpoint("hkr_rlt_soll_0", "HKR RLT Soll_0 (Heizkurve)", 22, TENTHS, "°C")
            .with_range(10.0, 75.0, Some(0.5)),
        setpoint("hkr_rlt_soll_uhg", "HKR RLT Soll_uHG (Heizkurve)", 23, TENTHS, "°C")
            .with_range(10.0, 75.0, Some(0.5)),
        setpoint("hkr_soll_raum", "HKR Soll_Raum", 69, TENTHS, "°C")
            .with_range(10.0, 25.0, Some(0.5)),
        setpoint("hkr_absenktemp", "HKR Absenktemp. (K)", 70, DataKind::Int, "K")
            .with_range(0.0, 10.0, Some(1.0)),
        setpoint("hkr_aufheiztemp", "HKR Aufheiztemp. (K)", 71, DataKind::Int, "K")
            .with_range(0.0, 10.0, Some(1.0)),
        setpoint("hkr_heizgrenze", "HKR Heizgrenze", 76, DataKind::Int, "°C")
            .with_range(0.0, 50.0, Some(1.0)),
        setpoint("ww_normaltemp", "WW Normaltemp.", 83, DataKind::Int, "°C")
            .with_range(10.0, 75.0, Some(1.0)),
        setpoint("ww_hysterese_normaltemp", "WW Hysterese Normaltemp.", 84, DataKind::Int, "K")
            .with_range(2.0, 15.0, Some(1.0)),
        setpoint("ww_minimaltemp", "WW Minimaltemp.", 85, DataKind::Int, "°C")
            .with_range(10.0, 75.0, Some(1.0)),
        setpoint("ww_hysterese_minimaltemp", "WW Hysterese Minimaltemp.", 86, DataKind::Int, "K")
            .with_range(2.0, 15.0, Some(1.0)),
        // ── Operating mode ──
        ParameterDescriptor::new("betriebsart", "Betriebsart", QueryClass::Individual, 13, DataKind::Enum)
            .read_write()
            .with_choices(OPERATING_MODES),
    ]
}

fn build() -> Catalog {
    let catalog = Catalog::from_descriptors(descriptors())
        .and_then(|c| c.with_default_selection(DEFAULT_SELECTION.iter().copied()));
    match catalog {
        Ok(catalog) => catalog,
        // The table above is static; a failure here is caught by the tests.
        Err(err) => {
            tracing::error!(error = %err, "built-in catalog is inconsistent");
            Catalog::empty()
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn builtin_table_is_consistent() {
        let catalog = Catalog::from_descriptors(descriptors()).unwrap();
        let catalog = catalog
            .with_default_selection(DEFAULT_SELECTION.iter().copied())
            .unwrap();
        assert_eq!(catalog.default_selection().len(), DEFAULT_SELECTION.len());
    }

    #[test]
    fn builtin_is_constructed_once() {
        let a = shared();
        let b = shared();
        assert!(Arc::ptr_eq(&a, &b));
        assert!(!a.is_empty());
    }

    #[test]
    fn room_setpoint_is_writable_individual() {
        let catalog = shared();
        let desc = catalog.lookup("hkr_soll_raum").unwrap();
        assert_eq!(desc.class, QueryClass::Individual);
        assert!(desc.is_writable());
    }
}
