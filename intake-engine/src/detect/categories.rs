//! Count-based detectors for the categorical fields.

use super::text::KeywordSet;
use super::{
    CONFIDENCE_CATEGORY_TIE, CONFIDENCE_CATEGORY_WIN, CONFIDENCE_COMBINED_PROCEDURE, Detection,
};
use crate::fields::{AssayType, Category, Procedure, TherapeuticArea};

const THERAPEUTIC_AREAS: &[(TherapeuticArea, KeywordSet)] = &[
    (
        TherapeuticArea::Cvrm,
        KeywordSet::terms(&[
            "cardiovascular",
            "cardiac",
            "heart",
            "vascular",
            "blood pressure",
            "hypertension",
            "atherosclerosis",
            "coronary",
            "myocardial",
            "stroke",
            "thrombosis",
            "anticoagulant",
            "lipid",
            "cholesterol",
            "cvrm",
        ]),
    ),
    (
        TherapeuticArea::Neurology,
        KeywordSet {
            terms: &[
                "neurological",
                "neurology",
                "brain",
                "spinal",
                "alzheimer",
                "parkinson",
                "multiple sclerosis",
                "epilepsy",
                "seizure",
                "dementia",
                "cognitive",
                "neurodegeneration",
                "neural",
                "neuron",
                "synapse",
                "lung",
                "respiratory",
                "pulmonary",
                "stem cell",
                "stem cells",
                "at2",
            ],
            acronyms: &["MS", "ALS"],
        },
    ),
    (
        TherapeuticArea::Oncology,
        KeywordSet::terms(&[
            "cancer",
            "tumor",
            "oncology",
            "chemotherapy",
            "radiation",
            "metastasis",
            "carcinoma",
            "sarcoma",
            "lymphoma",
            "leukemia",
            "malignant",
            "benign",
            "biopsy",
            "cytotoxic",
            "immunotherapy",
            "targeted therapy",
        ]),
    ),
    (
        TherapeuticArea::Ophthalmology,
        KeywordSet {
            terms: &[
                "eye",
                "eyes",
                "vision",
                "retina",
                "cornea",
                "glaucoma",
                "cataract",
                "macular",
                "ophthalmology",
                "ophthalmic",
                "visual",
                "intraocular",
                "vitreous",
                "diabetic retinopathy",
                "age-related macular degeneration",
            ],
            acronyms: &["AMD"],
        },
    ),
    (
        TherapeuticArea::InfectiousDiseases,
        KeywordSet::terms(&[
            "infection",
            "infectious",
            "bacterial",
            "viral",
            "fungal",
            "antibiotic",
            "antimicrobial",
            "pathogen",
            "sepsis",
            "pneumonia",
            "hepatitis",
            "hiv",
            "tuberculosis",
            "malaria",
            "vaccine",
            "immunization",
        ]),
    ),
    (
        TherapeuticArea::Immunology,
        KeywordSet::terms(&[
            "immune",
            "immunology",
            "autoimmune",
            "inflammation",
            "inflammatory",
            "rheumatoid",
            "lupus",
            "psoriasis",
            "crohn",
            "ulcerative colitis",
            "immunosuppressive",
            "cytokine",
            "antibody",
            "antigen",
            "t-cell",
            "b-cell",
        ]),
    ),
];

const BRIGHT_FIELD: KeywordSet = KeywordSet {
    terms: &[
        "bright field",
        "brightfield",
        "bright-field",
        "light microscopy",
        "transmitted light",
        "h&e",
        "hematoxylin",
        "eosin",
        "histology",
        "morphology",
    ],
    acronyms: &["BF"],
};

const FLUORESCENCE: KeywordSet = KeywordSet {
    terms: &[
        "fluorescence",
        "fluorescent",
        "immunofluorescence",
        "fitc",
        "tritc",
        "dapi",
        "gfp",
        "rfp",
        "alexa",
        "cy3",
        "cy5",
        "confocal",
    ],
    acronyms: &["IF"],
};

const COMBINED: KeywordSet = KeywordSet::terms(&[
    "bright field and fluorescence",
    "brightfield and fluorescence",
    "bf+if",
    "bf and if",
    "light and fluorescence",
    "combined",
]);

const ASSAY_TYPES: &[(AssayType, KeywordSet)] = &[
    (
        AssayType::HematoxylinEosin,
        KeywordSet::terms(&[
            "h&e",
            "hematoxylin and eosin",
            "hematoxylin",
            "eosin",
            "he stain",
            "routine stain",
            "standard stain",
            "morphology",
        ]),
    ),
    (
        AssayType::Ihc,
        KeywordSet {
            terms: &[
                "ihc",
                "immunohistochemistry",
                "immunohistochemical",
                "antibody staining",
                "primary antibody",
                "secondary antibody",
                "chromogen",
                "dab",
                "peroxidase",
            ],
            acronyms: &[],
        },
    ),
    (
        AssayType::SpecialStain,
        KeywordSet {
            terms: &[
                "special stain",
                "trichrome",
                "periodic acid schiff",
                "periodic acid-schiff",
                "congo red",
                "silver stain",
                "reticulin",
                "elastic",
                "mucin",
                "glycogen",
                "iron stain",
            ],
            acronyms: &["PAS"],
        },
    ),
    (
        AssayType::Other,
        KeywordSet::terms(&[
            "other stain",
            "custom stain",
            "research stain",
            "experimental stain",
        ]),
    ),
];

/// Picks the category with the strictly highest count, breaking ties by
/// table order. Zero total signal is a miss.
fn pick<C: Category>(table: &[(C, KeywordSet)], text: &str) -> Detection {
    let counts: Vec<(C, usize)> = table
        .iter()
        .map(|(category, keywords)| (*category, keywords.count(text)))
        .collect();
    let best = counts.iter().map(|(_, count)| *count).max().unwrap_or(0);
    if best == 0 {
        return Detection::miss();
    }
    let mut leaders = counts.iter().filter(|(_, count)| *count == best);
    let winner = leaders.next().map(|(category, _)| *category);
    let tied = leaders.next().is_some();
    match winner {
        Some(category) => {
            let confidence = if tied {
                CONFIDENCE_CATEGORY_TIE
            } else {
                CONFIDENCE_CATEGORY_WIN
            };
            Detection::found(category.label(), confidence)
        }
        None => Detection::miss(),
    }
}

pub fn detect_therapeutic_area(text: &str) -> Detection {
    pick(THERAPEUTIC_AREAS, text)
}

/// Bright-field and fluorescence signals together always mean the combined
/// procedure, whatever the individual counts.
pub fn detect_procedure(text: &str) -> Detection {
    let bright_field = BRIGHT_FIELD.count(text);
    let fluorescence = FLUORESCENCE.count(text);
    if bright_field > 0 && fluorescence > 0 {
        return Detection::found(Procedure::Combined.label(), CONFIDENCE_COMBINED_PROCEDURE);
    }
    let table = [
        (Procedure::BrightField, BRIGHT_FIELD),
        (Procedure::Fluorescence, FLUORESCENCE),
        (Procedure::Combined, COMBINED),
    ];
    pick(&table, text)
}

pub fn detect_assay_type(text: &str) -> Detection {
    pick(ASSAY_TYPES, text)
}
