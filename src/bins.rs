//! Static waste class -> disposal bin table.

/// Marker returned for any class label that has no bin assignment.
pub const UNKNOWN_WASTE_TYPE: &str = "Unknown waste type";

/// Recognized class labels and their disposal instructions.
///
/// Labels are matched exactly (case-sensitive), as returned by the model.
pub const BIN_MAP: &[(&str, &str)] = &[
    ("BLOOD", "🟡 Yellow Bin → Infectious and pathological waste"),
    (
        "Contaminated Plastic",
        "🔴 Red Bin → Contaminated plastic waste",
    ),
    (
        "Glass",
        "🔵 Blue Bin → Uncontaminated or disinfected glassware, bottles, vials",
    ),
    (
        "Sharp Object",
        "⚪ White Bin → Sharps (syringes, needles, scalpels, blades)",
    ),
];

/// Disposal instruction for a class label, or `UNKNOWN_WASTE_TYPE`.
pub fn bin_for(class_label: &str) -> &'static str {
    BIN_MAP
        .iter()
        .find(|(label, _)| *label == class_label)
        .map(|(_, bin)| *bin)
        .unwrap_or(UNKNOWN_WASTE_TYPE)
}
