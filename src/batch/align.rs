use crate::batch::segment::normalize_description;
use crate::batch::segment::IngredientDetail;
use crate::batch::segment::Step;
use std::collections::HashMap;
use std::collections::HashSet;
use tracing::debug;

/// Removes repeated steps, renumbers the rest `1..k` and realigns their ingredients.
///
/// Steps are unique by trimmed action text, the first one wins. Step numbers are reassigned
/// in order of first appearance; ingredients of a number with no surviving step are dropped.
/// With `dedupe_ingredients`, an ingredient repeating raw material, description, mass,
/// vendor and settings within the same step is dropped too. Detail sequences are recounted
/// from 1 per (step number, step sequence). Aligning an aligned result changes nothing.
///
/// Only the step number is remapped. An ingredient whose step sequence belonged to a dropped
/// duplicate keeps its sequence, so its (number, sequence) may name no kept step. Such
/// ingredients are kept as they are and logged at debug level.
pub fn align(
    steps: Vec<Step>,
    ingredients: Vec<IngredientDetail>,
    dedupe_ingredients: bool,
) -> (Vec<Step>, Vec<IngredientDetail>) {
    let mut actions = HashSet::<String>::new();
    let mut numbers = HashMap::<u32, u32>::new();
    let mut kept_steps = Vec::<Step>::with_capacity(steps.len());
    for mut step in steps {
        if !actions.insert(step.action_text.trim().to_owned()) {
            debug!(step = step.step_number, action = %step.action_text, "drop duplicate step");
            continue;
        }
        let next = numbers.len() as u32 + 1;
        step.step_number = *numbers.entry(step.step_number).or_insert(next);
        kept_steps.push(step);
    }

    let mut keys = HashSet::<String>::new();
    let mut kept_ingredients: Vec<IngredientDetail> = ingredients
        .into_iter()
        .filter_map(|mut ingredient| {
            ingredient.step_number = *numbers.get(&ingredient.step_number)?;
            Some(ingredient)
        })
        .filter(|ingredient| !dedupe_ingredients || keys.insert(ingredient_key(ingredient)))
        .collect();

    let owners: HashSet<(u32, u32)> = kept_steps.iter().map(|step| (step.step_number, step.step_sequence)).collect();
    for ingredient in &kept_ingredients {
        if !owners.contains(&(ingredient.step_number, ingredient.step_sequence)) {
            debug!(
                step = ingredient.step_number,
                sequence = ingredient.step_sequence,
                material = %ingredient.raw_material,
                "ingredient has no matching step"
            );
        }
    }

    kept_ingredients.sort_by_key(|ingredient| (ingredient.step_number, ingredient.step_sequence));
    let mut group = None::<(u32, u32)>;
    let mut detail_sequence = 0u32;
    for ingredient in &mut kept_ingredients {
        let owner = (ingredient.step_number, ingredient.step_sequence);
        if group != Some(owner) {
            group = Some(owner);
            detail_sequence = 0;
        }
        detail_sequence += 1;
        ingredient.detail_sequence = detail_sequence;
    }
    (kept_steps, kept_ingredients)
}

/// Identity of an ingredient within its step, case-insensitive
fn ingredient_key(ingredient: &IngredientDetail) -> String {
    [
        ingredient.step_number.to_string().as_str(),
        ingredient.raw_material.trim(),
        normalize_description(&ingredient.description).as_str(),
        ingredient.mass.trim(),
        ingredient.kind.as_str(),
        ingredient.speed.as_str(),
        ingredient.temperature.as_str(),
        ingredient.concentration.as_str(),
        ingredient.vendor.as_str(),
        ingredient.mixer_needed.as_str(),
    ]
    .join("|")
    .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::BTreeMap;

    fn step(step_number: u32, step_sequence: u32, action_text: &str) -> Step {
        Step {
            step_number,
            step_sequence,
            action_text: action_text.to_owned(),
        }
    }

    fn ingredient(step_number: u32, step_sequence: u32, description: &str) -> IngredientDetail {
        IngredientDetail {
            step_number,
            step_sequence,
            detail_sequence: 99,
            description: description.to_owned(),
            ..IngredientDetail::default()
        }
    }

    fn sample() -> (Vec<Step>, Vec<IngredientDetail>) {
        let steps = vec![
            step(3, 1, "Charge water"),
            step(5, 1, "Add thickener"),
            step(5, 2, "Rinse lines"),
            step(7, 1, " Charge water "),
            step(9, 1, "Cool"),
        ];
        let ingredients = vec![
            ingredient(9, 1, "Fragrance"),
            ingredient(3, 1, "Water"),
            ingredient(5, 2, "Water"),
            ingredient(7, 1, "Water"),
            ingredient(5, 1, "Xanthan"),
            ingredient(5, 1, "XANTHAN"),
            ingredient(5, 1, "Carbomer"),
        ];
        (steps, ingredients)
    }

    #[test]
    fn renumbers_kept_steps_contiguously() {
        let (steps, ingredients) = sample();
        let (steps, _) = align(steps, ingredients, true);
        assert_eq!(
            steps,
            vec![step(1, 1, "Charge water"), step(2, 1, "Add thickener"), step(2, 2, "Rinse lines"), step(3, 1, "Cool")]
        );
        let numbers: Vec<u32> = steps.iter().map(|step| step.step_number).collect::<std::collections::BTreeSet<_>>().into_iter().collect();
        assert_eq!(numbers, vec![1, 2, 3]);
    }

    #[test]
    fn realigns_and_dedupes_ingredients() {
        let (steps, ingredients) = sample();
        let (_, ingredients) = align(steps, ingredients, true);
        let rows: Vec<(u32, u32, u32, &str)> = ingredients
            .iter()
            .map(|ingredient| (ingredient.step_number, ingredient.step_sequence, ingredient.detail_sequence, ingredient.description.as_str()))
            .collect();
        assert_eq!(
            rows,
            vec![
                (1, 1, 1, "Water"),
                (2, 1, 1, "Xanthan"),
                (2, 1, 2, "Carbomer"),
                (2, 2, 1, "Water"),
                (3, 1, 1, "Fragrance"),
            ]
        );
    }

    #[test]
    fn duplicate_ingredients_can_be_kept() {
        let (steps, ingredients) = sample();
        let (_, ingredients) = align(steps, ingredients, false);
        let xanthan: Vec<u32> = ingredients
            .iter()
            .filter(|ingredient| ingredient.description.eq_ignore_ascii_case("xanthan"))
            .map(|ingredient| ingredient.detail_sequence)
            .collect();
        assert_eq!(xanthan, vec![1, 2]);
    }

    #[test]
    fn detail_sequences_have_no_gaps() {
        let (steps, ingredients) = sample();
        let (_, ingredients) = align(steps, ingredients, false);
        let mut groups = BTreeMap::<(u32, u32), Vec<u32>>::new();
        for ingredient in &ingredients {
            groups.entry((ingredient.step_number, ingredient.step_sequence)).or_default().push(ingredient.detail_sequence);
        }
        for sequences in groups.values() {
            let expected: Vec<u32> = (1..=sequences.len() as u32).collect();
            assert_eq!(sequences, &expected);
        }
    }

    #[test]
    fn aligning_twice_changes_nothing() {
        let (steps, ingredients) = sample();
        let once = align(steps, ingredients, true);
        let twice = align(once.0.clone(), once.1.clone(), true);
        assert_eq!(once, twice);
    }

    #[test]
    fn different_materials_in_one_step_are_both_kept() {
        let steps = vec![step(1, 1, "Mix")];
        let material = |raw_material: &str, mass: &str| IngredientDetail {
            step_number: 1,
            step_sequence: 1,
            raw_material: raw_material.to_owned(),
            mass: mass.to_owned(),
            ..IngredientDetail::default()
        };
        let ingredients = vec![material("Sugar", ""), material("Salt", ""), material("Salt", "2 kg"), material("salt", "")];
        let (_, ingredients) = align(steps, ingredients, true);
        let rows: Vec<(u32, &str, &str)> = ingredients
            .iter()
            .map(|ingredient| (ingredient.detail_sequence, ingredient.raw_material.as_str(), ingredient.mass.as_str()))
            .collect();
        assert_eq!(rows, vec![(1, "Sugar", ""), (2, "Salt", ""), (3, "Salt", "2 kg")]);
    }

    #[test]
    fn ingredient_of_dropped_sequence_is_kept_with_its_sequence() {
        let steps = vec![step(2, 1, "Heat"), step(2, 2, "Heat"), step(4, 1, "Cool")];
        let ingredients = vec![ingredient(2, 2, "Water"), ingredient(4, 1, "Ice")];
        let (steps, ingredients) = align(steps, ingredients, true);
        assert_eq!(steps, vec![step(1, 1, "Heat"), step(2, 1, "Cool")]);
        let rows: Vec<(u32, u32, u32, &str)> = ingredients
            .iter()
            .map(|ingredient| (ingredient.step_number, ingredient.step_sequence, ingredient.detail_sequence, ingredient.description.as_str()))
            .collect();
        assert_eq!(rows, vec![(1, 2, 1, "Water"), (2, 1, 1, "Ice")]);
    }

    #[test]
    fn empty_input_stays_empty() {
        assert_eq!(align(Vec::new(), Vec::new(), true), (Vec::new(), Vec::new()));
    }
}
