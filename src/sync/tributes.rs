//! Tribute line items from a detail view's tables.
//!
//! Detail pages have no stable layout, so column roles are inferred per table:
//! header keywords first, then a positional guess from the row width, then
//! content sniffing for rows where the guess does not land on an amount.

use std::collections::HashSet;

use crate::models::TributeRecord;
use crate::normalize::{looks_like_amount, looks_like_period};
use crate::portal::TableSnapshot;

const PERIOD_KEYWORDS: [&str; 3] = ["period", "período", "periodo"];
const CONCEPT_KEYWORDS: [&str; 4] = ["tributo", "concepto", "descripción", "descripcion"];
const AMOUNT_KEYWORDS: [&str; 3] = ["monto", "importe", "total"];

/// Column indices of one table's roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnRoles {
    pub period: Option<usize>,
    pub concept: usize,
    pub amount: usize,
}

fn find_keyword(headers: &[String], keywords: &[&str], taken: &[usize]) -> Option<usize> {
    headers.iter().enumerate().position(|(i, header)| {
        let header = header.to_lowercase();
        !taken.contains(&i) && keywords.iter().any(|k| header.contains(k))
    })
}

/// Roles named by header keywords. Needs at least concept and amount.
pub fn roles_from_headers(headers: &[String]) -> Option<ColumnRoles> {
    let period = find_keyword(headers, &PERIOD_KEYWORDS, &[]);
    let taken: Vec<usize> = period.into_iter().collect();
    let concept = find_keyword(headers, &CONCEPT_KEYWORDS, &taken)?;
    let taken: Vec<usize> = taken.into_iter().chain([concept]).collect();
    let amount = find_keyword(headers, &AMOUNT_KEYWORDS, &taken)?;
    Some(ColumnRoles {
        period,
        concept,
        amount,
    })
}

/// Layout guess from the number of cells in a row: two cells are concept and
/// amount, wider rows read period 0, concept 2 and amount 5.
pub fn roles_from_width(width: usize) -> Option<ColumnRoles> {
    match width {
        0 | 1 => None,
        2 => Some(ColumnRoles {
            period: None,
            concept: 0,
            amount: 1,
        }),
        _ => Some(ColumnRoles {
            period: Some(0),
            concept: 2,
            amount: 5,
        }),
    }
}

fn cell(cells: &[String], index: usize) -> Option<&str> {
    cells
        .get(index)
        .map(|c| c.trim())
        .filter(|c| !c.is_empty())
}

fn record(cells: &[String], roles: ColumnRoles) -> Option<TributeRecord> {
    Some(TributeRecord {
        period: roles.period.and_then(|i| cell(cells, i)).map(str::to_string),
        concept: cell(cells, roles.concept)?.to_string(),
        amount: cell(cells, roles.amount)?.to_string(),
    })
}

/// Read a row by its content: the first amount-looking cell is the amount, the
/// cell before it the concept, and the one before that the period if it looks
/// like one.
pub fn sniff_row(cells: &[String]) -> Option<TributeRecord> {
    let amount = cells.iter().position(|c| looks_like_amount(c))?;
    let concept = amount.checked_sub(1)?;
    let period = concept
        .checked_sub(1)
        .filter(|&i| looks_like_period(&cells[i]));
    record(
        cells,
        ColumnRoles {
            period,
            concept,
            amount,
        },
    )
}

fn header_roles(table: &TableSnapshot) -> Option<(ColumnRoles, usize)> {
    if let Some(roles) = roles_from_headers(&table.headers) {
        return Some((roles, 0));
    }
    // Some detail tables render their header as a plain data row.
    let first = table.rows.first()?;
    if first.cells.iter().any(|c| looks_like_amount(c)) {
        return None;
    }
    roles_from_headers(&first.cells).map(|roles| (roles, 1))
}

fn table_tributes(table: &TableSnapshot) -> Vec<TributeRecord> {
    match header_roles(table) {
        // Named columns are trusted as long as the amount cell is filled.
        Some((roles, skip)) => table
            .rows
            .iter()
            .skip(skip)
            .filter_map(|row| record(&row.cells, roles).or_else(|| sniff_row(&row.cells)))
            .collect(),
        None => table
            .rows
            .iter()
            .filter_map(|row| {
                roles_from_width(row.cells.len())
                    .filter(|roles| cell(&row.cells, roles.amount).is_some_and(looks_like_amount))
                    .and_then(|roles| record(&row.cells, roles))
                    .or_else(|| sniff_row(&row.cells))
            })
            .collect(),
    }
}

/// Tributes across all `tables`, deduplicated by (period, concept, amount) in
/// first-seen order.
pub fn extract_tributes(tables: &[TableSnapshot]) -> Vec<TributeRecord> {
    let mut seen = HashSet::new();
    let mut tributes = Vec::new();
    for table in tables {
        for tribute in table_tributes(table) {
            if seen.insert(tribute.clone()) {
                tributes.push(tribute);
            }
        }
    }
    tributes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::portal::TableRow;

    fn strings(cells: &[&str]) -> Vec<String> {
        cells.iter().map(|c| c.to_string()).collect()
    }

    fn table(headers: &[&str], rows: &[&[&str]]) -> TableSnapshot {
        TableSnapshot {
            index: 0,
            text: String::new(),
            headers: strings(headers),
            rows: rows
                .iter()
                .enumerate()
                .map(|(i, cells)| TableRow {
                    index: i + 1,
                    cells: strings(cells),
                    link: None,
                })
                .collect(),
        }
    }

    fn tribute(period: Option<&str>, concept: &str, amount: &str) -> TributeRecord {
        TributeRecord {
            period: period.map(str::to_string),
            concept: concept.to_string(),
            amount: amount.to_string(),
        }
    }

    #[test]
    fn header_keywords_pick_columns() {
        let roles = roles_from_headers(&strings(&["Código", "Período", "Tributo", "Importe"]));
        assert_eq!(
            roles,
            Some(ColumnRoles {
                period: Some(1),
                concept: 2,
                amount: 3,
            })
        );

        // "Total" alone cannot be both concept and amount.
        assert_eq!(roles_from_headers(&strings(&["Total"])), None);
        assert_eq!(
            roles_from_headers(&strings(&["Descripción", "Monto"])),
            Some(ColumnRoles {
                period: None,
                concept: 0,
                amount: 1,
            })
        );
    }

    #[test]
    fn width_guess() {
        assert_eq!(roles_from_width(1), None);
        assert_eq!(
            roles_from_width(2),
            Some(ColumnRoles {
                period: None,
                concept: 0,
                amount: 1,
            })
        );
        assert_eq!(
            roles_from_width(3),
            Some(ColumnRoles {
                period: Some(0),
                concept: 2,
                amount: 5,
            })
        );
        assert_eq!(
            roles_from_width(8),
            Some(ColumnRoles {
                period: Some(0),
                concept: 2,
                amount: 5,
            })
        );
    }

    #[test]
    fn sniffing_finds_amount_and_neighbours() {
        assert_eq!(
            sniff_row(&strings(&["x", "02/2025", "IGV", "S/. 120.00", "y"])),
            Some(tribute(Some("02/2025"), "IGV", "S/. 120.00"))
        );
        assert_eq!(
            sniff_row(&strings(&["Nota", "RENTA", "1,200"])),
            Some(tribute(None, "RENTA", "1,200"))
        );
        assert_eq!(sniff_row(&strings(&["S/. 120.00", "IGV"])), None);
        assert_eq!(sniff_row(&strings(&["sin montos"])), None);
    }

    #[test]
    fn extracts_with_headers() {
        let detail = table(
            &["Periodo", "Código", "Tributo", "Importe"],
            &[
                &["02/2025", "1011", "IGV", "S/. 100.00"],
                &["02/2025", "3031", "RENTA", "S/. 50.00"],
                &["", "", "", ""],
            ],
        );
        assert_eq!(
            extract_tributes(&[detail]),
            vec![
                tribute(Some("02/2025"), "IGV", "S/. 100.00"),
                tribute(Some("02/2025"), "RENTA", "S/. 50.00"),
            ]
        );
    }

    #[test]
    fn header_row_rendered_as_data() {
        let detail = table(
            &[],
            &[&["Concepto", "Monto"], &["Intereses", "S/. 3.10"]],
        );
        assert_eq!(extract_tributes(&[detail]), vec![tribute(None, "Intereses", "S/. 3.10")]);
    }

    #[test]
    fn falls_back_to_sniffing_when_positional_misses() {
        // Six cells: the positional amount column 5 holds a status, not an amount.
        let detail = table(&[], &[&["1", "02/2025", "IGV", "S/. 10.00", "x", "PAGADO"]]);
        assert_eq!(
            extract_tributes(&[detail]),
            vec![tribute(Some("02/2025"), "IGV", "S/. 10.00")]
        );
    }

    #[test]
    fn narrow_row_without_amount_column_is_sniffed() {
        // Column 5 does not exist, so the period comes from the cell before the concept.
        let detail = table(&[], &[&["1", "02/2025", "IGV", "S/. 10.00"]]);
        assert_eq!(
            extract_tributes(&[detail]),
            vec![tribute(Some("02/2025"), "IGV", "S/. 10.00")]
        );
    }

    #[test]
    fn header_row_without_amount_is_sniffed() {
        let detail = table(
            &["Periodo", "Tributo", "Nota", "Importe"],
            &[
                &["02/2025", "IGV", "S/. 5.00", ""],
                &["02/2025", "RENTA", "", "S/. 7.00"],
            ],
        );
        assert_eq!(
            extract_tributes(&[detail]),
            vec![
                tribute(Some("02/2025"), "IGV", "S/. 5.00"),
                tribute(Some("02/2025"), "RENTA", "S/. 7.00"),
            ]
        );
    }

    #[test]
    fn dedups_across_tables() {
        let first = table(&["Tributo", "Importe"], &[&["IGV", "S/. 1.00"], &["IGV", "S/. 1.00"]]);
        let second = table(&[], &[&["IGV", "S/. 1.00"], &["RENTA", "S/. 2.00"]]);
        assert_eq!(
            extract_tributes(&[first, second]),
            vec![tribute(None, "IGV", "S/. 1.00"), tribute(None, "RENTA", "S/. 2.00")]
        );
    }

    #[test]
    fn nothing_recognizable_is_empty() {
        let detail = table(&[], &[&["Sin datos"]]);
        assert!(extract_tributes(&[detail]).is_empty());
        assert!(extract_tributes(&[]).is_empty());
    }
}
