use utoipa::ToSchema;

const INDUSTRIES: &[&str] = &[
    "Entertainment",
    "Gaming",
    "Marketing",
    "Technology",
    "Finance",
    "Food",
    "Health",
    "Retail Store",
    "Real Estate",
    "Fashion",
    "Sports",
    "Education",
    "Transportation",
    "Travel",
];

#[derive(serde::Serialize, ToSchema, Debug, Clone)]
#[serde(untagged)]
pub enum Keywords {
    Flat(Vec<&'static str>),
    Grouped {
        difficulty: Vec<&'static str>,
        genres: Vec<&'static str>,
    },
}

#[derive(serde::Serialize, ToSchema, Debug, Clone)]
pub struct Category {
    pub name: &'static str,
    pub niche: Vec<&'static str>,
    pub industry: Vec<&'static str>,
    pub keywords: Keywords,
}

/// Options offered for each brief category.
pub fn categories() -> Vec<Category> {
    vec![
        Category {
            name: "Game Development",
            niche: vec!["Singleplayer", "Multiplayer", "MMO"],
            industry: vec![
                "Mobile",
                "PC",
                "Console",
                "Cross Platform",
                "Web Based",
                "Random",
            ],
            keywords: Keywords::Grouped {
                difficulty: vec!["Easy", "Medium", "Hard"],
                genres: vec![
                    "Battle Royale",
                    "Shooter (FPS/TPS)",
                    "Platformer",
                    "Fighting/Combat",
                    "Stealth",
                    "Survival",
                    "Metroidvania",
                    "Open World",
                    "Adventure",
                    "Horror",
                    "RPG",
                    "MOBA",
                    "Roguelike",
                    "Strategy",
                    "Idle",
                    "Tycoon",
                    "Simulation",
                    "Sports",
                    "Racing",
                    "Puzzle",
                    "Card/Deck",
                    "Detective",
                    "Casual/Party",
                    "Sandbox",
                    "Educational",
                    "Narrative/Visual Novel",
                ],
            },
        },
        Category {
            name: "Graphics & Design",
            niche: vec![
                "Motion Graphics",
                "Logo & Brand Identity",
                "UI/UX Design",
                "Print Design",
                "Art & Illustration",
                "Character Modelling",
                "Streaming Graphics",
                "Books",
                "Marketing Design",
                "Visual Design",
                "Fashion & Merchandise",
            ],
            industry: INDUSTRIES.to_vec(),
            keywords: Keywords::Flat(vec![
                "Minimalist",
                "Corporate",
                "Playful",
                "Elegant",
                "Vintage",
                "Modern",
                "Futuristic",
                "Hand-drawn",
            ]),
        },
        Category {
            name: "Copywriting",
            niche: vec![
                "Articles & Blogs",
                "Scriptwriting",
                "Speechwriting",
                "Creative Writing",
                "Podcast Writing",
                "Research & Summaries",
                "Content Editing",
                "Career Writing",
                "Business & Marketing",
                "Social Media",
                "Book & eBook Writing",
                "Translation & Localization",
                "Handwriting",
            ],
            industry: INDUSTRIES.to_vec(),
            keywords: Keywords::Flat(vec![
                "Persuasive",
                "Informative",
                "SEO-Optimized",
                "Storytelling",
                "Technical",
                "Humorous",
            ]),
        },
        Category {
            name: "Music & Audio",
            niche: vec![
                "Song Writers",
                "Custom Songs",
                "Voice Over",
                "Audiobook Production",
                "Audio Ads Production",
            ],
            industry: INDUSTRIES.to_vec(),
            keywords: Keywords::Flat(vec![
                "Orchestral",
                "Electronic",
                "Acoustic",
                "Cinematic",
                "Upbeat",
                "Ambient",
            ]),
        },
        Category {
            name: "AI Services",
            niche: vec![
                "Prompt Engineering",
                "AI Mobile Apps",
                "AI Websites & Softwares",
                "AI Chatbot",
                "AI Agents & Automations",
                "AI Image Generation",
                "AI Avatar Design",
                "AI Video Avatars",
                "AI Video Art",
                "AI Music Videos",
                "Text to Speech",
                "AI Content Editing",
                "ComfyUI Workflow Creation",
            ],
            industry: INDUSTRIES.to_vec(),
            keywords: Keywords::Flat(vec![
                "Innovative",
                "Efficient",
                "Personalized",
                "Automated",
                "Data-driven",
            ]),
        },
    ]
}

pub fn find(name: &str) -> Option<Category> {
    categories().into_iter().find(|c| c.name == name)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flatten(keywords: &Keywords) -> Vec<&'static str> {
        match keywords {
            Keywords::Flat(kws) => kws.clone(),
            Keywords::Grouped { difficulty, genres } => {
                difficulty.iter().chain(genres).copied().collect()
            }
        }
    }

    #[test]
    fn game_development_keywords_are_grouped() {
        let game = find("Game Development").unwrap();
        assert!(game.niche.contains(&"Singleplayer"));
        assert!(game.industry.contains(&"PC"));
        let all = flatten(&game.keywords);
        assert_eq!(&all[..3], &["Easy", "Medium", "Hard"]);
        assert!(all.contains(&"Roguelike"));

        let v = serde_json::to_value(&game).unwrap();
        assert!(v["keywords"]["difficulty"].is_array());
    }

    #[test]
    fn other_categories_share_industries() {
        for name in ["Graphics & Design", "Copywriting", "AI Services"] {
            let c = find(name).unwrap();
            assert_eq!(c.industry, INDUSTRIES);
            assert!(matches!(c.keywords, Keywords::Flat(_)));
        }
        assert!(find("Underwater Basket Weaving").is_none());
    }
}
