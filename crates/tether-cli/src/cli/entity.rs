use crate::cli::{
    open, parse_id, print_entity_table, print_report, DeleteArgs, EntityIdArgs, PersonCommands,
    PersonFields, TransactionCommands, TransactionFields,
};
use crate::config::Config;
use anyhow::{bail, Result};
use tether_core::{Entity, EntityKind, Person, Tether, Transaction, WriteOutcome};

pub fn run_person(cmd: PersonCommands, config: &Config) -> Result<()> {
    let tether = open(config)?;
    match cmd {
        PersonCommands::Create(fields) => {
            let mut person = Person::new();
            apply_person(&mut person, fields);
            let outcome = tether.create(person)?;
            print_written("Created", &tether, &outcome, config)
        }
        PersonCommands::Update(args) => {
            let id = parse_id(&args.id)?;
            let mut person = match tether.get(id)? {
                Some(Entity::Person(p)) => p,
                Some(other) => bail!("{} is a {}, not a person", id, other.kind()),
                None => bail!("Person {} not found", id),
            };
            apply_person(&mut person, args.fields);
            let outcome = tether.update(person)?;
            print_written("Updated", &tether, &outcome, config)
        }
        PersonCommands::Get(args) => get(&tether, args, EntityKind::Person, config),
        PersonCommands::List => list(&tether, EntityKind::Person, config),
        PersonCommands::Delete(args) => delete(&tether, args, EntityKind::Person),
    }
}

pub fn run_transaction(cmd: TransactionCommands, config: &Config) -> Result<()> {
    let tether = open(config)?;
    match cmd {
        TransactionCommands::Create(fields) => {
            let mut tx = Transaction::new();
            apply_transaction(&mut tx, fields);
            let outcome = tether.create(tx)?;
            print_written("Created", &tether, &outcome, config)
        }
        TransactionCommands::Update(args) => {
            let id = parse_id(&args.id)?;
            let mut tx = match tether.get(id)? {
                Some(Entity::Transaction(t)) => t,
                Some(other) => bail!("{} is a {}, not a transaction", id, other.kind()),
                None => bail!("Transaction {} not found", id),
            };
            apply_transaction(&mut tx, args.fields);
            let outcome = tether.update(tx)?;
            print_written("Updated", &tether, &outcome, config)
        }
        TransactionCommands::Get(args) => get(&tether, args, EntityKind::Transaction, config),
        TransactionCommands::List => list(&tether, EntityKind::Transaction, config),
        TransactionCommands::Delete(args) => delete(&tether, args, EntityKind::Transaction),
    }
}

/// Overwrite only the fields that were given
fn apply_person(person: &mut Person, fields: PersonFields) {
    if fields.first_name.is_some() {
        person.first_name = fields.first_name;
    }
    if fields.last_name.is_some() {
        person.last_name = fields.last_name;
    }
    if fields.email.is_some() {
        person.email = fields.email;
    }
    if fields.phone.is_some() {
        person.phone = fields.phone;
    }
    if fields.address.is_some() {
        person.address = fields.address;
    }
}

fn apply_transaction(tx: &mut Transaction, fields: TransactionFields) {
    if fields.amount.is_some() {
        tx.amount = fields.amount;
    }
    if fields.currency.is_some() {
        tx.currency = fields.currency;
    }
    if fields.status.is_some() {
        tx.status = fields.status;
    }
    if fields.device_id.is_some() {
        tx.device_id = fields.device_id;
    }
    if fields.ip_address.is_some() {
        tx.ip_address = fields.ip_address;
    }
    if fields.payment_method.is_some() {
        tx.payment_method = fields.payment_method;
    }
}

fn print_written(verb: &str, tether: &Tether, outcome: &WriteOutcome, config: &Config) -> Result<()> {
    if config.json() {
        let entity = tether.get(outcome.id)?;
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "entity": entity,
                "detection": outcome.detection,
            }))?
        );
        return Ok(());
    }

    println!("{} {}", verb, outcome.id);
    if let Some(report) = &outcome.detection {
        print_report(report, false)?;
    }
    Ok(())
}

fn get(tether: &Tether, args: EntityIdArgs, kind: EntityKind, config: &Config) -> Result<()> {
    let id = parse_id(&args.id)?;
    let entity = match tether.get(id)? {
        Some(e) if e.kind() == kind => e,
        _ => bail!("{} {} not found", kind, id),
    };

    if config.json() {
        println!("{}", serde_json::to_string_pretty(&entity)?);
    } else {
        print_entity_table(std::slice::from_ref(&entity));
    }
    Ok(())
}

fn list(tether: &Tether, kind: EntityKind, config: &Config) -> Result<()> {
    let entities = tether.list(kind)?;

    if config.json() {
        println!("{}", serde_json::to_string_pretty(&entities)?);
    } else {
        println!("Total: {} {} entities", entities.len(), kind);
        print_entity_table(&entities);
    }
    Ok(())
}

fn delete(tether: &Tether, args: DeleteArgs, kind: EntityKind) -> Result<()> {
    let id = parse_id(&args.id)?;
    match tether.get(id)? {
        Some(e) if e.kind() == kind => {}
        _ => bail!("{} {} not found", kind, id),
    }

    if !args.yes {
        use inquire::Confirm;
        let confirmed = Confirm::new(&format!("Delete {} {} and its connections?", kind, id))
            .with_default(false)
            .prompt()?;
        if !confirmed {
            println!("Aborted.");
            return Ok(());
        }
    }

    let removed = tether.delete(id)?;
    println!("Deleted {} {} ({} connections removed)", kind, id, removed);
    Ok(())
}
