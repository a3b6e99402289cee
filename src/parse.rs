/// One of the four labelled lines the model is asked to answer with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    CompanyName,
    CompanyDescription,
    ProjectDescription,
    Deadline,
}

impl Section {
    // Matched as case-insensitive prefixes, in this order.
    const LABELS: [(&'static str, Section); 4] = [
        ("company name", Section::CompanyName),
        ("company description", Section::CompanyDescription),
        ("project description", Section::ProjectDescription),
        ("deadline", Section::Deadline),
    ];

    fn match_line(line: &str) -> Option<(Section, &str)> {
        Self::LABELS.iter().find_map(|(label, section)| {
            let head = line.get(..label.len())?;
            head.eq_ignore_ascii_case(label).then(|| {
                let rest = line[label.len()..].trim_start();
                let rest = rest.strip_prefix(':').unwrap_or(rest);
                (*section, rest.trim())
            })
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedBrief {
    pub company_name: String,
    pub company_description: String,
    pub project_description: String,
    pub deadline: String,
}

impl ParsedBrief {
    /// Names of required fields that came back empty.
    pub fn missing_required(&self) -> Vec<&'static str> {
        [
            ("Company Name", &self.company_name),
            ("Company Description", &self.company_description),
            ("Project Description", &self.project_description),
        ]
        .into_iter()
        .filter(|(_, v)| v.is_empty())
        .map(|(name, _)| name)
        .collect()
    }

    fn field_mut(&mut self, section: Section) -> &mut String {
        match section {
            Section::CompanyName => &mut self.company_name,
            Section::CompanyDescription => &mut self.company_description,
            Section::ProjectDescription => &mut self.project_description,
            Section::Deadline => &mut self.deadline,
        }
    }
}

/// Split generated text into the four brief fields.
///
/// A line starting (case-insensitively) with a label opens that section,
/// and the rest of the line seeds it. Following unlabelled lines are
/// appended to the open section, newline-separated. Text before the
/// first label is dropped. `**` markers are removed from company name and
/// deadline and kept in the descriptions, which get rendered with bold.
pub fn parse_brief_text(text: &str) -> ParsedBrief {
    let mut parsed = ParsedBrief::default();
    let mut current: Option<Section> = None;

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match Section::match_line(line) {
            Some((section, seed)) => {
                current = Some(section);
                *parsed.field_mut(section) = seed.to_string();
            }
            None => {
                if let Some(section) = current {
                    let field = parsed.field_mut(section);
                    if !field.is_empty() {
                        field.push('\n');
                    }
                    field.push_str(line);
                }
            }
        }
    }

    parsed.company_name = strip_bold(parsed.company_name.trim());
    parsed.deadline = strip_bold(parsed.deadline.trim());
    parsed.company_description = parsed.company_description.trim().to_string();
    parsed.project_description = parsed.project_description.trim().to_string();
    parsed
}

fn strip_bold(s: &str) -> String {
    s.replace("**", "").trim().to_string()
}
