//! Baseline Context Provider
//!
//! Curated, strictly qualitative climate knowledge: sector explainers,
//! country energy/policy contexts, policy frameworks and the four persona
//! framings. Used directly for BASELINE answers and as enrichment on HYBRID
//! answers. The provider never emits numbers; anything quantitative must
//! come from the warehouse.

use once_cell::sync::Lazy;
use serde::Serialize;
use std::collections::HashMap;

use crate::models::{Persona, Sector};
use crate::services::intent::IntentClassifier;

/// Enrichment attached to a HYBRID answer.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BaselineEnrichment {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sector_explanation: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country_context: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trend_context: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seasonal_context: Option<String>,
    pub interpretation_focus: String,
}

/// One persona framing: how the interpretation section should read.
#[derive(Debug, Clone, Serialize)]
pub struct PersonaFraming {
    pub focus: &'static str,
    pub tone: &'static str,
    pub key_questions: [&'static str; 3],
}

static SECTOR_EXPLAINERS: Lazy<HashMap<Sector, &'static str>> = Lazy::new(|| {
    HashMap::from([
        (
            Sector::Transport,
            "Transport emissions come from burning liquid fuels in road vehicles, \
             shipping, rail and domestic aviation. Road traffic dominates the sector \
             in most countries, which ties the trend closely to fleet composition, \
             fuel economy standards and the pace of electrification.",
        ),
        (
            Sector::Power,
            "Power-sector emissions arise from fossil-fuelled electricity and heat \
             generation. The sector responds quickly to changes in the generation \
             mix, so coal-to-gas switching and renewable build-out show up faster \
             here than in any other sector.",
        ),
        (
            Sector::Agriculture,
            "Agricultural emissions are dominated by methane from livestock and rice \
             cultivation and nitrous oxide from fertilised soils. They move slowly, \
             tracking herd sizes, cropping patterns and fertiliser practice rather \
             than energy markets.",
        ),
        (
            Sector::Waste,
            "Waste emissions are mostly methane from landfills and wastewater \
             treatment. Capture systems and diversion from landfill reduce them; \
             the trend reflects waste-management infrastructure more than economic \
             activity.",
        ),
        (
            Sector::Buildings,
            "Buildings emissions come from on-site fuel use for heating, hot water \
             and cooking. They are strongly weather-sensitive, with cold winters \
             lifting the total, and respond to insulation standards and heat-pump \
             adoption.",
        ),
        (
            Sector::FuelExploitation,
            "Fuel-exploitation emissions cover extraction, processing and transport \
             of coal, oil and gas, including venting and flaring. They track \
             production volumes in extracting regions rather than domestic \
             consumption.",
        ),
        (
            Sector::IndustrialCombustion,
            "Industrial-combustion emissions come from fuel burned for process heat \
             in manufacturing. They follow industrial output and the carbon \
             intensity of the fuels used, so efficiency programmes and fuel \
             switching drive the trend.",
        ),
        (
            Sector::IndustrialProcesses,
            "Industrial-process emissions are released by chemistry rather than \
             combustion, notably cement calcination and steel, ammonia and \
             aluminium production. They are hard to abate without process \
             redesign or carbon capture.",
        ),
    ])
});

static COUNTRY_CONTEXTS: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        (
            "Germany",
            "Germany combines a large industrial base with an explicit coal \
             phase-out and rapid renewable expansion under the Energiewende. \
             Transport has been its most stubborn sector, while power-sector \
             emissions have fallen as lignite plants retire.",
        ),
        (
            "United States of America",
            "The United States has seen power-sector emissions decline through \
             coal-to-gas switching and renewables, while transport remains the \
             largest source. Federal policy has oscillated, with state-level \
             programmes such as California's doing much of the steady work.",
        ),
        (
            "China",
            "China is the world's largest emitter in absolute terms, with a \
             coal-heavy power system and the world's biggest industrial base. It \
             is simultaneously the largest builder of renewables; the balance of \
             those two forces sets the national trend.",
        ),
        (
            "India",
            "India's emissions are rising from a comparatively low per-capita \
             base as electricity access and industry expand. Coal dominates the \
             power mix while ambitious solar targets shape expectations for the \
             coming decade.",
        ),
        (
            "United Kingdom",
            "The United Kingdom has largely eliminated coal from its power mix \
             and carries a legally binding net-zero target. Recent reductions \
             have come mainly from the power sector, leaving transport and \
             buildings as the hard remainder.",
        ),
        (
            "France",
            "France's power sector is unusually low-carbon thanks to nuclear \
             generation, so its emissions profile is dominated by transport, \
             buildings and agriculture instead of electricity.",
        ),
        (
            "Japan",
            "Japan's emissions rose after nuclear capacity was idled following \
             Fukushima and have been drifting down since as reactors restart and \
             renewables expand. Industry and transport weigh heavily in its \
             profile.",
        ),
        (
            "Brazil",
            "Brazil's energy system is comparatively clean thanks to hydropower \
             and biofuels, which makes agriculture and land use the dominant \
             themes in its emissions story.",
        ),
        (
            "Australia",
            "Australia pairs a coal-heavy domestic power system with a large \
             fossil-fuel export industry, so fuel exploitation matters unusually \
             much in its profile. Rooftop solar adoption is among the highest in \
             the world.",
        ),
        (
            "Canada",
            "Canada's emissions are shaped by oil-sands extraction, long \
             transport distances and a cold climate, set against a largely \
             hydro-powered electricity system in several provinces.",
        ),
    ])
});

static POLICY_FRAMEWORKS: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        (
            "paris agreement",
            "The Paris Agreement is the international climate treaty adopted in \
             Paris under the UNFCCC. Each party sets nationally determined \
             contributions, ratcheted over time, with the collective aim of \
             holding warming well below two degrees and pursuing efforts towards \
             one and a half. It relies on transparency and peer pressure rather \
             than binding national targets.",
        ),
        (
            "kyoto protocol",
            "The Kyoto Protocol was the first binding international emissions \
             treaty, assigning reduction obligations to industrialised countries \
             and introducing market mechanisms such as emissions trading and the \
             Clean Development Mechanism. It has been superseded in practice by \
             the Paris Agreement.",
        ),
        (
            "emissions trading",
            "An emissions trading system caps total emissions for covered \
             sectors and lets firms trade allowances under the cap. The EU ETS \
             is the oldest large example; the cap declines over time so the \
             carbon price reflects scarcity.",
        ),
        (
            "carbon pricing",
            "Carbon pricing puts a cost on each tonne emitted, either through a \
             tax or a trading system, so that abatement happens where it is \
             cheapest. Coverage and price levels vary widely between \
             jurisdictions.",
        ),
        (
            "net zero",
            "Net zero means residual emissions are balanced by removals so the \
             net contribution to the atmosphere is nil. Credible net-zero \
             strategies lean on deep gross reductions first, with removals \
             reserved for the hardest residuals.",
        ),
        (
            "edgar",
            "EDGAR is the Emissions Database for Global Atmospheric Research, a \
             globally consistent, spatially resolved emissions inventory \
             maintained by the European Commission's Joint Research Centre. Its \
             strength is comparability across countries and years rather than \
             official national reporting status.",
        ),
    ])
});

static PERSONA_FRAMINGS: Lazy<HashMap<Persona, PersonaFraming>> = Lazy::new(|| {
    HashMap::from([
        (
            Persona::Analyst,
            PersonaFraming {
                focus: "operational drivers and near-term deltas",
                tone: "direct, decision-oriented, no hedging beyond the stated uncertainty",
                key_questions: [
                    "What moved and by how much?",
                    "Which sector drives the change?",
                    "What should be watched next quarter?",
                ],
            },
        ),
        (
            Persona::Researcher,
            PersonaFraming {
                focus: "methodology, uncertainty and comparability",
                tone: "precise, caveated, citation-minded",
                key_questions: [
                    "How robust is this figure?",
                    "What is the uncertainty envelope?",
                    "How does the inventory treat this source?",
                ],
            },
        ),
        (
            Persona::Financial,
            PersonaFraming {
                focus: "transition risk and exposure signals",
                tone: "materiality-first, comfortable with ranges",
                key_questions: [
                    "Is the trajectory consistent with stated targets?",
                    "Where is policy exposure concentrated?",
                    "What does the trend imply for asset risk?",
                ],
            },
        ),
        (
            Persona::Student,
            PersonaFraming {
                focus: "mechanisms and intuition",
                tone: "plain language, concepts before caveats",
                key_questions: [
                    "What causes these emissions?",
                    "Why does the number change over time?",
                    "How does this compare in everyday terms?",
                ],
            },
        ),
    ])
});

/// The provider itself. Constructed once at startup and shared read-only.
pub struct BaselineProvider;

impl BaselineProvider {
    pub fn new() -> Self {
        Self
    }

    pub fn persona_framing(&self, persona: Persona) -> &'static PersonaFraming {
        PERSONA_FRAMINGS.get(&persona).expect("all personas have framings")
    }

    pub fn sector_explainer(&self, sector: Sector) -> Option<&'static str> {
        SECTOR_EXPLAINERS.get(&sector).copied()
    }

    pub fn country_context(&self, canonical_name: &str) -> Option<&'static str> {
        COUNTRY_CONTEXTS.get(canonical_name).copied()
    }

    /// Enrichment for a HYBRID answer. Best-effort: anything that cannot be
    /// derived from the question is simply absent.
    pub fn enrich(&self, question: &str, persona: Persona) -> BaselineEnrichment {
        let intent = IntentClassifier::classify(question, persona);
        let folded = question.to_lowercase();

        let sector_explanation = intent
            .sectors
            .first()
            .and_then(|s| self.sector_explainer(*s))
            .map(str::to_string);

        let country_context = intent
            .entities
            .iter()
            .find_map(|e| self.country_context(e))
            .map(str::to_string);

        let trend_context = (folded.contains("trend")
            || folded.contains("change")
            || intent.year_range.is_some())
        .then(|| {
            "Multi-year movements in inventory data reflect structural shifts \
             (fuel mix, technology, activity levels) rather than year-to-year \
             weather noise; single-year jumps deserve scepticism until \
             corroborated."
                .to_string()
        });

        let seasonal_context = (folded.contains("seasonal") || folded.contains("monthly"))
            .then(|| {
                "Monthly profiles mix genuine seasonality (heating demand, \
                 harvest cycles) with reporting artefacts, so peak and trough \
                 months are more informative than any single month's level."
                    .to_string()
            });

        let framing = self.persona_framing(persona);
        BaselineEnrichment {
            sector_explanation,
            country_context,
            trend_context,
            seasonal_context,
            interpretation_focus: framing.focus.to_string(),
        }
    }

    /// Fully qualitative answer for a BASELINE question. The caller
    /// guarantees no tool calls are made on this path.
    pub fn baseline_answer(&self, question: &str, persona: Persona) -> String {
        let folded = question.to_lowercase();
        let framing = self.persona_framing(persona);

        let mut parts: Vec<String> = Vec::new();

        let mut framework_keys: Vec<&&str> = POLICY_FRAMEWORKS.keys().collect();
        framework_keys.sort();
        for keyword in framework_keys {
            if folded.contains(*keyword) {
                parts.push(POLICY_FRAMEWORKS[*keyword].to_string());
            }
        }

        let intent = IntentClassifier::classify(question, persona);
        for sector in &intent.sectors {
            if let Some(text) = self.sector_explainer(*sector) {
                parts.push(text.to_string());
            }
        }
        for entity in &intent.entities {
            if let Some(text) = self.country_context(entity) {
                parts.push(text.to_string());
            }
        }

        if parts.is_empty() {
            parts.push(
                "This question falls outside the curated knowledge base. It can \
                 still be answered against the emissions warehouse if it is \
                 rephrased around a sector, place and time period."
                    .to_string(),
            );
        }

        parts.push(format!("Framed for a {} audience: {}.", persona.as_str(), framing.focus));
        parts.join("\n\n")
    }
}

impl Default for BaselineProvider {
    fn default() -> Self {
        Self::new()
    }
}
