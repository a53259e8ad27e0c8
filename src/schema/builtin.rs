//! Fixed table of the genealogy entities and their `tblXX` tables.

use super::{DeletionPolicy, EntitySchema, Reference};
use crate::core::FieldType::{Flag, Integer, Real, Text};

/// Name of the owners relation consulted by the ownership guard.
pub const OWNERS_ENTITY: &str = "RecOwners";

/// `Events.idtype` of an event whose `idime` is a Persons key.
pub const EVENT_OF_PERSON: i64 = 0;
/// `Events.idtype` of an event whose `idime` is a Families key.
pub const EVENT_OF_FAMILY: i64 = 20;

/// `Citations.type` values whose `idime` is a Persons key: name, birth,
/// christening, death, burial, notes, death cause and the LDS ordinances.
pub const PERSON_CITATION_TYPES: &[i64] = &[1, 2, 3, 4, 5, 6, 7, 8, 9, 15, 16, 26, 27];
/// `Citations.type` values whose `idime` is a Families key: sealing to
/// spouse, never married, marriage and its note, end and children flags.
pub const FAMILY_CITATION_TYPES: &[i64] = &[18, 19, 20, 21, 22, 23, 24];

pub fn owners_entity() -> EntitySchema {
    EntitySchema::new(OWNERS_ENTITY, "tblRO")
        .primary_key("ro_index", "RO_Index")
        .field("ro_username", "RO_Username", Text)
        .field("ro_table", "RO_Table", Text)
        .field("ro_keyname", "RO_KeyName", Text)
        .field("ro_keyvalue", "RO_KeyValue", Integer)
        .owned()
}

pub fn genealogy_entities() -> Vec<EntitySchema> {
    vec![
        EntitySchema::new("Persons", "tblIR")
            .primary_key("idir", "IDIR")
            .field("surname", "Surname", Text)
            .field("givenname", "GivenName", Text)
            .field("soundslike", "SoundsLike", Text)
            .field("gender", "Gender", Integer)
            .field("birthd", "BirthD", Text)
            .field("birthsd", "BirthSD", Integer)
            .field("idlrbirth", "IDLRBirth", Integer)
            .field("chrisd", "ChrisD", Text)
            .field("idlrchris", "IDLRChris", Integer)
            .field("deathd", "DeathD", Text)
            .field("deathsd", "DeathSD", Integer)
            .field("idlrdeath", "IDLRDeath", Integer)
            .field("buriedd", "BuriedD", Text)
            .field("idlrburied", "IDLRBuried", Integer)
            .field("deathcause", "DeathCause", Text)
            .field("idmrpref", "IDMRPref", Integer)
            .field("idmrparents", "IDMRParents", Integer)
            .field("private", "Private", Flag)
            .field("nevermarried", "NeverMarried", Flag)
            .field("notes", "Notes", Text)
            .owned()
            .deletion(DeletionPolicy::ReportDependents(vec![
                Reference::new("Events", "idime").when("idtype", [EVENT_OF_PERSON]),
                Reference::new("Citations", "idime").when("type", PERSON_CITATION_TYPES.iter().copied()),
                Reference::new("Names", "idir"),
                Reference::new("Children", "idir"),
            ])),
        EntitySchema::new("Families", "tblMR")
            .primary_key("idmr", "IDMR")
            .field("idirhusb", "IDIRHusb", Integer)
            .field("husbsurname", "HusbSurname", Text)
            .field("husbgivenname", "HusbGivenName", Text)
            .field("idirwife", "IDIRWife", Integer)
            .field("wifesurname", "WifeSurname", Text)
            .field("wifegivenname", "WifeGivenName", Text)
            .field("mard", "MarD", Text)
            .field("marsd", "MarSD", Integer)
            .field("idlrmar", "IDLRMar", Integer)
            .field("marendd", "MarEndD", Text)
            .field("notes", "Notes", Text)
            .owned()
            .deletion(DeletionPolicy::ReportDependents(vec![
                Reference::new("Children", "idmr"),
                Reference::new("Events", "idime").when("idtype", [EVENT_OF_FAMILY]),
                Reference::new("Citations", "idime").when("type", FAMILY_CITATION_TYPES.iter().copied()),
            ])),
        EntitySchema::new("Children", "tblCR")
            .primary_key("idcr", "IDCR")
            .field("idmr", "IDMR", Integer)
            .field("idir", "IDIR", Integer)
            .field("order", "Order", Integer)
            .field("idcs", "IDCS", Integer),
        EntitySchema::new("Events", "tblER")
            .primary_key("ider", "IDER")
            .field("idime", "IDIME", Integer)
            .field("idtype", "IDType", Integer)
            .field("idet", "IDET", Integer)
            .field("eventd", "EventD", Text)
            .field("eventsd", "EventSD", Integer)
            .field("idlrevent", "IDLREvent", Integer)
            .field("description", "Description", Text)
            .field("order", "Order", Integer)
            .field("preferred", "Preferred", Flag),
        EntitySchema::new("Citations", "tblSX")
            .primary_key("idsx", "IDSX")
            .field("idsr", "IDSR", Integer)
            .field("idime", "IDIME", Integer)
            .field("type", "Type", Integer)
            .field("srcdetail", "SrcDetail", Text)
            .field("order", "Order", Integer),
        EntitySchema::new("Sources", "tblSR")
            .primary_key("idsr", "IDSR")
            .field("srcname", "SrcName", Text)
            .field("srctitle", "SrcTitle", Text)
            .field("idst", "IDST", Integer)
            .field("srcauthor", "SrcAuthor", Text)
            .field("srcpubl", "SrcPubl", Text)
            .field("srccallnum", "SrcCallNum", Text)
            .field("srcnote", "SrcNote", Text)
            .deletion(DeletionPolicy::RequireNoReferences(vec![Reference::new("Citations", "idsr")])),
        EntitySchema::new("Locations", "tblLR")
            .primary_key("idlr", "IDLR")
            .field("preposition", "Preposition", Text)
            .field("location", "Location", Text)
            .field("sortedlocation", "SortedLocation", Text)
            .field("shortname", "ShortName", Text)
            .field("latitude", "Latitude", Real)
            .field("longitude", "Longitude", Real)
            .field("zoom", "Zoom", Integer)
            .field("boundary", "Boundary", Text)
            .field("notes", "Notes", Text)
            .field("used", "Used", Flag)
            .field("tag1", "Tag1", Flag)
            .field("qstag", "qsTag", Flag)
            .field("verified", "Verified", Flag)
            .deletion(DeletionPolicy::RequireNoReferences(vec![
                Reference::new("Persons", "idlrbirth"),
                Reference::new("Persons", "idlrchris"),
                Reference::new("Persons", "idlrdeath"),
                Reference::new("Persons", "idlrburied"),
                Reference::new("Families", "idlrmar"),
                Reference::new("Events", "idlrevent"),
            ])),
        EntitySchema::new("Temples", "tblTR")
            .primary_key("idtr", "IDTR")
            .field("code", "Code", Text)
            .field("code2", "Code2", Text)
            .field("temple", "Temple", Text)
            .field("templestart", "TempleStart", Integer)
            .field("templeend", "TempleEnd", Integer)
            .field("used", "Used", Flag),
        EntitySchema::new("Names", "tblNX")
            .primary_key("idnx", "IDNX")
            .field("idir", "IDIR", Integer)
            .field("surname", "Surname", Text)
            .field("givenname", "GivenName", Text)
            .field("akanote", "AkaNote", Text)
            .field("order", "Order", Integer)
            .field("preferredaka", "PreferredAka", Flag),
        EntitySchema::new("Addresses", "tblAR")
            .primary_key("idar", "IDAR")
            .field("kind", "Kind", Integer)
            .field("addrname", "AddrName", Text)
            .field("address1", "Address1", Text)
            .field("city", "City", Text)
            .field("state", "State", Text)
            .field("zipcode", "ZipCode", Text)
            .field("country", "Country", Text)
            .field("email", "Email", Text)
            .field("homepage", "Homepage", Text)
            .owned(),
        EntitySchema::new("ToDoEntries", "tblTD")
            .primary_key("idtd", "IDTD")
            .field("idir", "IDIR", Integer)
            .field("todoname", "ToDoName", Text)
            .field("idtc", "IDTC", Integer)
            .field("idtl", "IDTL", Integer)
            .field("opend", "OpenD", Text)
            .field("closed", "CloseD", Text)
            .field("private", "Private", Flag)
            .field("notes", "Notes", Text),
        owners_entity(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Ownership;

    #[test]
    fn test_every_builtin_entity_validates() {
        for schema in genealogy_entities() {
            schema.validate().unwrap();
        }
    }

    #[test]
    fn test_persons_are_owned_locations_shared() {
        let entities = genealogy_entities();
        let persons = entities.iter().find(|e| e.name() == "Persons").unwrap();
        let locations = entities.iter().find(|e| e.name() == "Locations").unwrap();
        assert_eq!(persons.ownership(), Ownership::Owned);
        assert_eq!(locations.ownership(), Ownership::Shared);
        assert_eq!(locations.deletion_policy().references().len(), 6);
    }

    #[test]
    fn test_shared_idime_is_told_apart_by_type() {
        let entities = genealogy_entities();
        let refs = |name: &str| {
            entities
                .iter()
                .find(|e| e.name() == name)
                .unwrap()
                .deletion_policy()
                .references()
                .to_vec()
        };
        for reference in refs("Persons").iter().chain(refs("Families").iter()) {
            if reference.field == "idime" {
                assert!(reference.discriminator.is_some(), "{} idime without type", reference.entity);
            }
        }
        let persons = refs("Persons");
        let families = refs("Families");
        let person_citation = persons.iter().find(|r| r.entity == "Citations").unwrap();
        let family_citation = families.iter().find(|r| r.entity == "Citations").unwrap();
        let (_, person_types) = person_citation.discriminator.as_ref().unwrap();
        let (_, family_types) = family_citation.discriminator.as_ref().unwrap();
        assert!(person_types.iter().all(|t| !family_types.contains(t)));
    }
}
