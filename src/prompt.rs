use crate::brief::GeneratorFormData;

pub fn build(form: &GeneratorFormData) -> String {
    let deadline_instruction = if form.deadline.is_empty() {
        "Based on the project's category, niche, industry, and keywords \
        (especially considering any difficulty keywords like 'Easy', \
        'Medium', or 'Hard'), determine and provide a realistic project \
        deadline."
            .to_string()
    } else {
        format!(
            "The project deadline is strictly set to {}. Design a project \
            with a scope, complexity, and set of deliverables that are \
            realistically achievable within this exact timeframe.",
            form.deadline
        )
    };
    format!(
        "You are a creative director. Generate a detailed and unique creative brief.
The brief is for a fictional company. Ensure the company name is unique and creative.
The project is in the category of \"{category}\", with a niche of \"{niche}\" for the \"{industry}\" industry.
Incorporate these keywords for inspiration: {keywords}.
Use Markdown for emphasis, specifically using double asterisks (**) for bolding important terms.
{deadline_instruction}

Structure your response *exactly* as follows, with each title on a new line:

Company Name: [Fictional Company Name]
Company Description: [A paragraph describing the company.]
Project Description: [A detailed paragraph describing the project, goals, and deliverables.]
Deadline: [The determined or provided deadline, e.g., \"3 Weeks\", \"1 Month\"]
",
        category = form.category,
        niche = form.niche,
        industry = form.industry,
        keywords = form.keywords.join(", "),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form(deadline: &str) -> GeneratorFormData {
        GeneratorFormData {
            category: "Game Development".into(),
            niche: "Singleplayer".into(),
            industry: "PC".into(),
            keywords: vec!["Easy".into(), "Horror".into()],
            deadline: deadline.into(),
        }
    }

    #[test]
    fn embeds_every_field_and_the_four_labels() {
        let p = build(&form("2 weeks"));
        assert!(p.contains("\"Game Development\""));
        assert!(p.contains("\"Singleplayer\""));
        assert!(p.contains("\"PC\" industry"));
        assert!(p.contains("Easy, Horror."));
        assert!(p.contains("strictly set to 2 weeks"));
        for label in [
            "\nCompany Name:",
            "\nCompany Description:",
            "\nProject Description:",
            "\nDeadline:",
        ] {
            assert!(p.contains(label), "{label}");
        }
    }

    #[test]
    fn no_deadline_asks_the_model_to_pick_one() {
        let p = build(&form(""));
        assert!(!p.contains("strictly set"));
        assert!(p.contains("determine and provide a realistic project deadline"));
    }
}
